//! Automatic escalation.
//!
//! One run per trigger: resolve the session to a patient, ask the rule engine for the next
//! step, generate the claim text for each decided kind and persist every success with the
//! store's atomic append-and-flip. Concurrent triggers for the same event are filtered out in
//! front of this, by [`crate::idempotency::EventGuard`].

use std::collections::BTreeMap;
use std::sync::Arc;

use nme_types::PatientKey;
use serde::Serialize;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::followup::colombia_today;
use crate::generator::{ClaimGenerator, ClaimOutput, GenerationError};
use crate::model::{ClaimKind, ClaimRecord, ClaimState, PreviousClaimFilter};
use crate::oracle::FallbackOracle;
use crate::rules::{decide_next_escalation, decide_next_escalation_on, Decision, HoldCause};
use crate::store::PatientClaimStore;
use crate::templates::YamlPromptCatalog;
use crate::ClaimResult;

/// Failure taxonomy carried on results. Never shown to end users.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    NotFound,
    ValidationFailed,
    GenerationFailed,
    /// The claim text exists but could not be saved.
    PersistenceFailed,
    UnhandledState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every decided claim was generated and saved.
    Escalated,
    /// Some of several decided claims were saved.
    PartiallyEscalated,
    Held,
    /// A desacato needs tutela ruling data from the user first.
    NeedsTutelaData,
    Failed,
}

/// A claim generated and saved by this run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedClaim {
    pub claim_id: Uuid,
    pub flipped: usize,
    pub output: ClaimOutput,
}

/// A decided claim that was not saved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimFailure {
    pub kind: ClaimKind,
    pub error_kind: OutcomeKind,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrchestrationOutcome {
    pub success: bool,
    pub status: OutcomeStatus,
    pub error_kind: Option<OutcomeKind>,
    pub session_id: String,
    pub patient_key: Option<PatientKey>,
    pub level: Option<u32>,
    pub reason: String,
    pub attempted: usize,
    pub created: Vec<CreatedClaim>,
    pub failures: Vec<ClaimFailure>,
    /// Tutela fields to collect when `status` is `NeedsTutelaData`.
    pub missing_fields: Vec<String>,
}

impl OrchestrationOutcome {
    fn new(session_id: &str, status: OutcomeStatus, reason: impl Into<String>) -> Self {
        Self {
            success: matches!(status, OutcomeStatus::Escalated | OutcomeStatus::Held),
            status,
            error_kind: None,
            session_id: session_id.to_string(),
            patient_key: None,
            level: None,
            reason: reason.into(),
            attempted: 0,
            created: Vec::new(),
            failures: Vec::new(),
            missing_fields: Vec::new(),
        }
    }

    fn failed(session_id: &str, kind: OutcomeKind, reason: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind),
            ..Self::new(session_id, OutcomeStatus::Failed, reason)
        }
    }

    /// Kinds of the claims created by this run.
    pub fn claim_kinds(&self) -> Vec<ClaimKind> {
        self.created.iter().map(|c| c.output.kind).collect()
    }
}

pub struct EscalationOrchestrator {
    store: Arc<dyn PatientClaimStore>,
    generator: ClaimGenerator,
    same_day_guard: bool,
}

impl EscalationOrchestrator {
    pub fn new(
        store: Arc<dyn PatientClaimStore>,
        generator: ClaimGenerator,
        same_day_guard: bool,
    ) -> Self {
        Self {
            store,
            generator,
            same_day_guard,
        }
    }

    /// Wire an orchestrator from startup configuration: the YAML prompt catalog and the
    /// configured provider chain over `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt catalog cannot be loaded or a provider cannot be built.
    pub fn from_config(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn PatientClaimStore>,
    ) -> ClaimResult<Self> {
        let catalog = YamlPromptCatalog::load(cfg.prompts_file())?;
        let oracle = FallbackOracle::from_config(&cfg)?;
        let generator = ClaimGenerator::new(
            store.clone(),
            Arc::new(catalog),
            Arc::new(oracle),
            cfg.oracle_timeout(),
        );
        Ok(Self::new(store, generator, cfg.same_day_guard()))
    }

    pub fn store(&self) -> &Arc<dyn PatientClaimStore> {
        &self.store
    }

    /// Run one escalation for the patient behind `session_id`.
    ///
    /// Expected conditions come back as an [`OrchestrationOutcome`]; a failure to save a
    /// generated claim is reported as `PersistenceFailed` on the outcome.
    ///
    /// Appends at the current level are accepted, since one step can file several claims.
    /// Two concurrent triggers for the same session can therefore both append the same step.
    /// Callers de-duplicate triggers with [`crate::EventGuard`] before calling this.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the patient cannot be looked up at all.
    pub fn auto_escalate(&self, session_id: &str) -> ClaimResult<OrchestrationOutcome> {
        tracing::info!("automatic escalation for session {}", session_id);

        let Some(key) = self.store.find_patient_by_session(session_id)? else {
            tracing::warn!("no patient for session {}", session_id);
            return Ok(OrchestrationOutcome::failed(
                session_id,
                OutcomeKind::NotFound,
                "Paciente no encontrado para esta sesión",
            ));
        };
        let Some(patient) = self.store.get_patient(&key)? else {
            return Ok(OrchestrationOutcome {
                patient_key: Some(key),
                ..OrchestrationOutcome::failed(
                    session_id,
                    OutcomeKind::NotFound,
                    "Datos del paciente no encontrados",
                )
            });
        };

        let decision = if self.same_day_guard {
            decide_next_escalation_on(
                patient.risk_category(),
                &patient.reclamaciones,
                colombia_today(),
            )
        } else {
            decide_next_escalation(patient.risk_category(), &patient.reclamaciones)
        };
        tracing::info!("decision for {}: {:?}", key, decision);

        let meds = patient.undelivered_medications().join(", ");
        let mut outcome = match decision {
            Decision::Hold { reason, cause } => {
                let mut outcome =
                    OrchestrationOutcome::new(session_id, OutcomeStatus::Held, reason);
                if cause == HoldCause::NotContemplated {
                    outcome.success = false;
                    outcome.error_kind = Some(OutcomeKind::UnhandledState);
                }
                outcome
            }
            Decision::Error { reason } => {
                OrchestrationOutcome::failed(session_id, OutcomeKind::ValidationFailed, reason)
            }
            Decision::Generate {
                claim_kind,
                level,
                review_days,
                reason,
            } => self.run(&key, session_id, &[claim_kind], level, review_days, reason, &meds),
            Decision::GenerateMultiple {
                claim_kinds,
                level,
                review_days,
                reason,
            } => self.run(&key, session_id, &claim_kinds, level, review_days, reason, &meds),
        };
        outcome.patient_key = Some(key);
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        key: &PatientKey,
        session_id: &str,
        kinds: &[ClaimKind],
        level: u32,
        review_days: u32,
        reason: String,
        meds: &str,
    ) -> OrchestrationOutcome {
        let mut outcome = OrchestrationOutcome::new(session_id, OutcomeStatus::Failed, reason);
        outcome.level = Some(level);
        outcome.attempted = kinds.len();

        for &kind in kinds {
            match self.generator.generate_claim(key, kind, level, &BTreeMap::new()) {
                Ok(output) => match self.persist(key, session_id, &output, review_days, meds) {
                    Ok(created) => outcome.created.push(created),
                    Err(e) => {
                        tracing::error!(
                            "generated {} for {} but could not save it: {}",
                            kind,
                            key,
                            e
                        );
                        outcome.failures.push(ClaimFailure {
                            kind,
                            error_kind: OutcomeKind::PersistenceFailed,
                            reason: e.to_string(),
                        });
                    }
                },
                Err(GenerationError::NeedsTutelaData { missing, .. }) => {
                    tracing::info!("{} needs tutela data before a desacato", key);
                    outcome.missing_fields = missing;
                    outcome.failures.push(ClaimFailure {
                        kind,
                        error_kind: OutcomeKind::ValidationFailed,
                        reason: "Datos de tutela incompletos para generar desacato".to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!("{} for {} not generated: {}", kind, key, e);
                    outcome.failures.push(ClaimFailure {
                        kind,
                        error_kind: e.outcome_kind(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let created = outcome.created.len();
        outcome.status = if created == kinds.len() {
            OutcomeStatus::Escalated
        } else if created > 0 {
            OutcomeStatus::PartiallyEscalated
        } else if !outcome.missing_fields.is_empty() {
            OutcomeStatus::NeedsTutelaData
        } else {
            OutcomeStatus::Failed
        };
        outcome.success = created > 0;
        outcome.error_kind = match outcome.status {
            OutcomeStatus::Escalated => None,
            _ => outcome.failures.first().map(|f| f.error_kind),
        };
        if created > 0 {
            tracing::info!(
                "escalated {} to level {}: {}/{} claims saved",
                key,
                level,
                created,
                kinds.len()
            );
        }
        outcome
    }

    fn persist(
        &self,
        key: &PatientKey,
        session_id: &str,
        output: &ClaimOutput,
        review_days: u32,
        meds: &str,
    ) -> ClaimResult<CreatedClaim> {
        let claim = ClaimRecord::pending(
            output.kind,
            output.level,
            review_days,
            output.text.clone(),
            meds,
            session_id,
        );
        let filter = PreviousClaimFilter {
            id_session: session_id.to_string(),
            tipo_accion: ClaimKind::ReclamacionEps,
            below_level: output.level,
        };
        let appended = self
            .store
            .append_claim(key, claim, &filter, ClaimState::Escalado)?;
        Ok(CreatedClaim {
            claim_id: appended.claim_id,
            flipped: appended.flipped,
            output: output.clone(),
        })
    }
}
