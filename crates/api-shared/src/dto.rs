//! Request and response bodies for the claims API.
//!
//! These are wire types only. Values such as claim kinds and dates travel as the strings the
//! store uses (`reclamacion_eps`, `2025-03-01`) and are parsed by the handlers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EscalationReq {
    /// External id of the triggering event, used for de-duplication.
    pub event_id: String,
    pub session_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatedClaimRes {
    pub claim_id: String,
    pub tipo_accion: String,
    pub nivel_escalamiento: u32,
    /// Earlier claims moved to `escalado` by this append.
    pub flipped: usize,
    pub plazo_respuesta: String,
    pub texto: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClaimFailureRes {
    pub tipo_accion: String,
    pub error_kind: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EscalationRes {
    pub success: bool,
    /// `escalated`, `partially_escalated`, `held`, `needs_tutela_data` or `failed`.
    pub status: String,
    pub error_kind: Option<String>,
    pub session_id: String,
    pub patient_key: Option<String>,
    pub nivel_escalamiento: Option<u32>,
    pub reason: String,
    pub claims: Vec<CreatedClaimRes>,
    pub failures: Vec<ClaimFailureRes>,
    pub missing_fields: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EventReq {
    pub event_id: String,
    /// Raw button callback, e.g. `escalate_yes_<session_id>`.
    pub callback_data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReplyOptionRes {
    pub title: String,
    pub callback_data: String,
}

/// A message the channel adapter should deliver to the patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReplyRes {
    /// `text`, `buttons` or `document`.
    pub kind: String,
    /// Message body, or the caption of a document.
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ReplyOptionRes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventRes {
    pub event: String,
    pub session_id: Option<String>,
    /// Present when the event triggered an escalation.
    pub escalation: Option<EscalationRes>,
    /// Replies for the patient, in send order.
    #[serde(default)]
    pub replies: Vec<ReplyRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListPatientsRes {
    pub patients: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EligibilityRes {
    pub tipo_accion: String,
    pub can_escalate: bool,
    pub missing: Vec<String>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TutelaReq {
    pub tutela_id: String,
    pub numero_sentencia: String,
    /// `DD/MM/AAAA` or `AAAA-MM-DD`.
    pub fecha_sentencia: String,
    /// `DD/MM/AAAA` or `AAAA-MM-DD`.
    pub fecha_radicacion_tutela: String,
    pub juzgado: String,
    pub ciudad: String,
    /// `favorable`, `desfavorable` or `pendiente`.
    pub resultado: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TutelaRes {
    pub tutela_id: String,
    pub resultado: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FilingReq {
    pub numero_radicado: String,
    /// `AAAA-MM-DD` or `DD/MM/AAAA`.
    pub fecha_radicacion: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FilingRes {
    pub claim_id: String,
    pub estado_reclamacion: String,
    pub numero_radicado: String,
    pub fecha_revision: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentReq {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DocumentRes {
    pub claim_id: String,
    pub url_documento: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DueReviewRes {
    pub patient_key: String,
    pub claim_id: String,
    pub tipo_accion: String,
    pub nivel_escalamiento: u32,
    pub numero_radicado: String,
    pub fecha_revision: String,
    pub id_session: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DueReviewsRes {
    pub date: String,
    pub reviews: Vec<DueReviewRes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_request_uses_snake_case_fields() {
        let req: EscalationReq =
            serde_json::from_str(r#"{"event_id":"wamid.1","session_id":"TL_1"}"#).unwrap();
        assert_eq!(req.event_id, "wamid.1");
        assert_eq!(req.session_id, "TL_1");
    }
}
