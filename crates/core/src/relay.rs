//! Relaying orchestration results to the patient.
//!
//! The messaging platform and the document pipeline are external; they are reached through
//! [`MessagingChannel`] and [`DocumentRenderer`]. Messages never expose the failure taxonomy,
//! only a friendly Spanish text.

use std::sync::Mutex;

use nme_types::PatientKey;
use serde::Serialize;
use uuid::Uuid;

use crate::events::ChannelEvent;
use crate::generator::ClaimOutput;
use crate::intake::{next_missing_field, TutelaDraft, TutelaField, TUTELA_FIELDS};
use crate::model::ClaimUpdate;
use crate::orchestrator::{CreatedClaim, OrchestrationOutcome, OutcomeKind, OutcomeStatus};
use crate::store::PatientClaimStore;
use crate::ClaimError;

pub const MANUAL_REVIEW_TEXT: &str = "⚠️ No pudimos completar tu escalamiento automáticamente.\n\n\
     Nuestro equipo revisará tu caso manualmente y te contactaremos pronto.";

const IN_REVIEW_TEXT: &str =
    "📋 Caso en revisión.\n\nTe contactaremos pronto para darle seguimiento al proceso.";

const TUTELA_DATA_INTRO: &str = "🔄 *Para proceder con el desacato necesito datos de tu tutela:*";

#[derive(Debug, thiserror::Error)]
#[error("messaging channel failed: {0}")]
pub struct ChannelError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("document rendering failed: {0}")]
    Render(String),
    #[error("document storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Store(#[from] ClaimError),
}

/// A reply button; `callback_data` comes back as a [`ChannelEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonOption {
    pub title: String,
    pub callback_data: String,
}

impl ButtonOption {
    pub fn new(title: impl Into<String>, event: &ChannelEvent) -> Self {
        Self {
            title: title.into(),
            callback_data: event.callback_id(),
        }
    }
}

pub trait MessagingChannel: Send + Sync {
    fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    fn send_buttons(
        &self,
        recipient: &str,
        text: &str,
        options: &[ButtonOption],
    ) -> Result<(), ChannelError>;

    fn send_document(
        &self,
        recipient: &str,
        url: &str,
        filename: &str,
        caption: &str,
    ) -> Result<(), ChannelError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedDocument {
    pub url: String,
    pub filename: String,
}

/// Turns a claim text into a signed-ready document and stores it.
pub trait DocumentRenderer: Send + Sync {
    fn render_and_store(&self, output: &ClaimOutput) -> Result<RenderedDocument, RenderError>;
}

/// A message queued for the patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Text {
        text: String,
    },
    Buttons {
        text: String,
        options: Vec<ButtonOption>,
    },
    Document {
        url: String,
        filename: String,
        caption: String,
    },
}

/// A channel that queues messages for the caller to deliver, in send order.
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Mutex<Vec<OutgoingMessage>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_messages(self) -> Vec<OutgoingMessage> {
        self.queued
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.queued
            .lock()
            .map_err(|_| ChannelError("outbox lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

impl MessagingChannel for Outbox {
    fn send_text(&self, _recipient: &str, text: &str) -> Result<(), ChannelError> {
        self.push(OutgoingMessage::Text {
            text: text.to_string(),
        })
    }

    fn send_buttons(
        &self,
        _recipient: &str,
        text: &str,
        options: &[ButtonOption],
    ) -> Result<(), ChannelError> {
        self.push(OutgoingMessage::Buttons {
            text: text.to_string(),
            options: options.to_vec(),
        })
    }

    fn send_document(
        &self,
        _recipient: &str,
        url: &str,
        filename: &str,
        caption: &str,
    ) -> Result<(), ChannelError> {
        self.push(OutgoingMessage::Document {
            url: url.to_string(),
            filename: filename.to_string(),
            caption: caption.to_string(),
        })
    }
}

/// Renderer used when documents are produced out of band and attached later through the
/// store's document update. Every render reports the document as pending.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferredRenderer;

impl DocumentRenderer for DeferredRenderer {
    fn render_and_store(&self, output: &ClaimOutput) -> Result<RenderedDocument, RenderError> {
        Err(RenderError::Render(format!(
            "{} document for {} is produced out of band",
            output.kind, output.patient_key
        )))
    }
}

/// What was delivered to the patient.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub messages: usize,
    pub documents: usize,
    /// Claims whose document could not be produced.
    pub render_failures: Vec<Uuid>,
}

/// Tell the patient what happened to their escalation.
///
/// Tutela and desacato claims are rendered, their document URL is written back to the store
/// and the document is sent. A render failure is reported to the patient as a pending
/// document and recorded on the report.
///
/// # Errors
///
/// Returns `RelayError::Channel` if a message cannot be sent and `RelayError::Store` if the
/// document URL cannot be saved.
pub fn relay_outcome(
    outcome: &OrchestrationOutcome,
    channel: &dyn MessagingChannel,
    recipient: &str,
    renderer: &dyn DocumentRenderer,
    store: &dyn PatientClaimStore,
) -> Result<RelayReport, RelayError> {
    let mut report = RelayReport::default();

    match outcome.status {
        OutcomeStatus::Escalated | OutcomeStatus::PartiallyEscalated => {
            channel.send_text(recipient, &escalation_summary(outcome))?;
            report.messages += 1;

            for created in &outcome.created {
                if created.output.kind.needs_document() {
                    deliver_document(created, channel, recipient, renderer, store, &mut report)?;
                }
            }

            if outcome.status == OutcomeStatus::PartiallyEscalated {
                channel.send_text(
                    recipient,
                    "⚠️ Una de las gestiones no se pudo completar. Nuestro equipo la revisará.",
                )?;
                report.messages += 1;
            }
        }
        OutcomeStatus::Held => {
            let text = if outcome.error_kind == Some(OutcomeKind::UnhandledState) {
                MANUAL_REVIEW_TEXT
            } else {
                IN_REVIEW_TEXT
            };
            channel.send_text(recipient, text)?;
            report.messages += 1;
        }
        OutcomeStatus::NeedsTutelaData => {
            let field = stored_tutela_gap(outcome, store)
                .or_else(|| {
                    TUTELA_FIELDS
                        .into_iter()
                        .find(|f| outcome.missing_fields.iter().any(|m| m == f.as_str()))
                })
                .unwrap_or(TutelaField::NumeroSentencia);
            channel.send_text(
                recipient,
                &format!("{}\n\n{}", TUTELA_DATA_INTRO, field.prompt()),
            )?;
            report.messages += 1;
        }
        OutcomeStatus::Failed => {
            tracing::info!(
                "escalation for session {} failed ({:?}), manual review message sent",
                outcome.session_id,
                outcome.error_kind
            );
            channel.send_text(recipient, MANUAL_REVIEW_TEXT)?;
            report.messages += 1;
        }
    }

    Ok(report)
}

/// First field the patient's favorable tutela still lacks, if one is stored.
fn stored_tutela_gap(
    outcome: &OrchestrationOutcome,
    store: &dyn PatientClaimStore,
) -> Option<TutelaField> {
    let key = outcome.patient_key.as_ref()?;
    match store.get_favorable_tutela(key, None) {
        Ok(record) => next_missing_field(&TutelaDraft::from_record(&record?)),
        Err(e) => {
            tracing::warn!("could not read tutela of {}: {}", key, e);
            None
        }
    }
}

fn escalation_summary(outcome: &OrchestrationOutcome) -> String {
    let labels: Vec<&str> = outcome
        .created
        .iter()
        .map(|c| c.output.kind.label())
        .collect();
    let level = outcome
        .level
        .map(|l| l.to_string())
        .unwrap_or_else(|| "-".to_string());

    let headline = if labels.len() > 1 {
        "✅ *Escalamiento múltiple exitoso*"
    } else {
        "✅ *Escalamiento exitoso*"
    };
    format!(
        "{}\n\nSe generó: *{}*\nNivel de escalamiento: *{}*\n\n📋 *Motivo:* {}\n\n\
         Te mantendremos informado.",
        headline,
        labels.join(" y "),
        level,
        outcome.reason
    )
}

fn deliver_document(
    created: &CreatedClaim,
    channel: &dyn MessagingChannel,
    recipient: &str,
    renderer: &dyn DocumentRenderer,
    store: &dyn PatientClaimStore,
    report: &mut RelayReport,
) -> Result<(), RelayError> {
    let output = &created.output;
    let document = match renderer.render_and_store(output) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(
                "rendering {} for {} failed: {}",
                output.kind,
                output.patient_key,
                e
            );
            report.render_failures.push(created.claim_id);
            channel.send_text(
                recipient,
                &format!(
                    "📄 Tu {} está lista, pero el documento aún se está preparando. \
                     Te lo enviaremos en breve.",
                    output.kind.label()
                ),
            )?;
            report.messages += 1;
            return Ok(());
        }
    };

    attach_document(store, &output.patient_key, created.claim_id, &document.url)?;

    let caption = format!(
        "📄 Tu {} está lista. Imprímela, fírmala y radícala en el juzgado.",
        output.kind.label()
    );
    channel.send_document(recipient, &document.url, &document.filename, &caption)?;
    report.documents += 1;
    Ok(())
}

fn attach_document(
    store: &dyn PatientClaimStore,
    key: &PatientKey,
    claim_id: Uuid,
    url: &str,
) -> Result<(), ClaimError> {
    store.update_claim(key, claim_id, ClaimUpdate::DocumentUrl(url.to_string()))?;
    Ok(())
}

/// Ask the patient whether to escalate to `next_step`.
pub fn offer_escalation(
    channel: &dyn MessagingChannel,
    recipient: &str,
    session_id: &str,
    next_step: &str,
) -> Result<(), ChannelError> {
    let options = [
        ButtonOption::new(
            "✅ Sí, quiero escalar",
            &ChannelEvent::EscalateYes {
                session_id: session_id.to_string(),
            },
        ),
        ButtonOption::new(
            "❌ No, por ahora no",
            &ChannelEvent::EscalateNo {
                session_id: session_id.to_string(),
            },
        ),
    ];
    channel.send_buttons(
        recipient,
        &format!(
            "💔 Lamento que no hayas recibido tus medicamentos.\n\n\
             ¿Deseas escalar tu caso y entablar *{next_step}*?"
        ),
        &options,
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum Sent {
        Text(String),
        Buttons(String, Vec<ButtonOption>),
        Document { url: String, caption: String },
    }

    #[derive(Default)]
    pub(crate) struct RecordingChannel {
        pub(crate) sent: Mutex<Vec<Sent>>,
    }

    impl RecordingChannel {
        pub(crate) fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MessagingChannel for RecordingChannel {
        fn send_text(&self, _recipient: &str, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
            Ok(())
        }

        fn send_buttons(
            &self,
            _recipient: &str,
            text: &str,
            options: &[ButtonOption],
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Buttons(text.to_string(), options.to_vec()));
            Ok(())
        }

        fn send_document(
            &self,
            _recipient: &str,
            url: &str,
            _filename: &str,
            caption: &str,
        ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(Sent::Document {
                url: url.to_string(),
                caption: caption.to_string(),
            });
            Ok(())
        }
    }

    pub(crate) struct FixedRenderer {
        pub(crate) fail: bool,
    }

    impl DocumentRenderer for FixedRenderer {
        fn render_and_store(&self, output: &ClaimOutput) -> Result<RenderedDocument, RenderError> {
            if self.fail {
                return Err(RenderError::Render("layout engine offline".into()));
            }
            Ok(RenderedDocument {
                url: format!("https://docs.example/{}/{}.pdf", output.patient_key, output.kind),
                filename: format!("{}.pdf", output.kind),
            })
        }
    }
}
