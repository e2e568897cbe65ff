//! # NME Core
//!
//! Claims escalation logic for undelivered medications.
//!
//! This crate holds the synchronous domain:
//! - The escalation ladder per risk category ([`rules`])
//! - Eligibility checks before a claim kind is drafted ([`requirements`])
//! - Claim text generation through a prompt catalog and a text oracle ([`generator`])
//! - One-shot automatic escalation with atomic append-and-flip ([`orchestrator`])
//! - Patient claim storage, in memory or as versioned sharded files ([`store`])
//! - Follow-up scheduling, tutela data intake and relaying results to the patient
//!
//! **No API concerns**: HTTP servers, authentication and DTOs belong in `api-rest` and
//! `api-shared`.

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod followup;
pub mod generator;
pub mod idempotency;
pub mod intake;
pub mod model;
pub mod oracle;
pub mod orchestrator;
pub mod relay;
pub mod requirements;
pub mod rules;
pub mod store;
pub mod templates;

pub(crate) mod versioned_files;

pub use config::{CoreConfig, ProviderConfig};
pub use error::{ClaimError, ClaimResult};
pub use nme_types::{NonEmptyText, PatientKey};

pub use events::ChannelEvent;
pub use generator::{ClaimGenerator, ClaimOutput, GenerationError};
pub use idempotency::EventGuard;
pub use model::{ClaimKind, ClaimRecord, ClaimState, Patient, TutelaOutcome, TutelaRecord};
pub use orchestrator::{EscalationOrchestrator, OrchestrationOutcome, OutcomeKind, OutcomeStatus};
pub use rules::{decide_next_escalation, decide_next_escalation_on, Decision};
pub use store::{FileClaimStore, MemoryClaimStore, PatientClaimStore};
