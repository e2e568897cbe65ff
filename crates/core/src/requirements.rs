//! Escalation prerequisite checks.
//!
//! A Supersalud complaint or a tutela needs a filed EPS claim first. A desacato needs a
//! favorable tutela ruling on record. The tutela store is consulted directly for desacato, so a
//! `tutela` entry in the claim list is not enough on its own.

use nme_types::PatientKey;
use serde::{Deserialize, Serialize};

use crate::model::ClaimKind;
use crate::store::PatientClaimStore;
use crate::{ClaimError, ClaimResult};

pub const REQ_EPS_RADICADA: &str = "reclamacion_eps_radicada";
pub const REQ_TUTELA_FAVORABLE: &str = "tutela_favorable";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub kind: ClaimKind,
    pub can_escalate: bool,
    pub missing: Vec<String>,
    pub reason: String,
}

impl EligibilityReport {
    fn allowed(kind: ClaimKind) -> Self {
        Self {
            kind,
            can_escalate: true,
            missing: Vec::new(),
            reason: format!("{} habilitada", kind.label()),
        }
    }

    fn blocked(kind: ClaimKind, requirement: &str, reason: String) -> Self {
        Self {
            kind,
            can_escalate: false,
            missing: vec![requirement.to_string()],
            reason,
        }
    }
}

/// Check whether the patient may escalate to `kind`.
///
/// # Errors
///
/// Returns `ClaimError::PatientNotFound` for an unknown key, or the store's error.
pub fn validate_escalation_requirements(
    store: &dyn PatientClaimStore,
    key: &PatientKey,
    kind: ClaimKind,
) -> ClaimResult<EligibilityReport> {
    if store.get_patient(key)?.is_none() {
        return Err(ClaimError::PatientNotFound(key.to_string()));
    }

    let report = match kind {
        ClaimKind::ReclamacionEps => EligibilityReport::allowed(kind),
        ClaimKind::ReclamacionSupersalud | ClaimKind::Tutela => {
            if store
                .get_prior_radicados(key, &[ClaimKind::ReclamacionEps])?
                .is_empty()
            {
                EligibilityReport::blocked(
                    kind,
                    REQ_EPS_RADICADA,
                    format!(
                        "Para la {} se requiere al menos una reclamación EPS previa con radicado",
                        kind.label()
                    ),
                )
            } else {
                EligibilityReport::allowed(kind)
            }
        }
        ClaimKind::Desacato => {
            if store.get_favorable_tutela(key, None)?.is_none() {
                EligibilityReport::blocked(
                    kind,
                    REQ_TUTELA_FAVORABLE,
                    "Para el incidente de desacato se requiere una tutela favorable previa registrada"
                        .to_string(),
                )
            } else {
                EligibilityReport::allowed(kind)
            }
        }
    };

    if !report.can_escalate {
        tracing::info!(
            "escalation to {} blocked for {}: missing {:?}",
            kind,
            key,
            report.missing
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClaimRecord, ClaimState, ClaimUpdate, PreviousClaimFilter};
    use crate::store::test_support::{complete_patient, favorable_tutela};
    use crate::store::MemoryClaimStore;

    fn key() -> PatientKey {
        PatientKey::parse("COCC39287966").unwrap()
    }

    fn store() -> MemoryClaimStore {
        let store = MemoryClaimStore::new();
        store
            .register_patient(complete_patient("COCC39287966", "priorizado", "s1"))
            .unwrap();
        store
    }

    #[test]
    fn supersalud_needs_a_filed_eps_claim() {
        let store = store();
        let report =
            validate_escalation_requirements(&store, &key(), ClaimKind::ReclamacionSupersalud)
                .unwrap();
        assert!(!report.can_escalate);
        assert_eq!(report.missing, vec![REQ_EPS_RADICADA.to_string()]);

        let claim = ClaimRecord::pending(ClaimKind::ReclamacionEps, 1, 5, "", "", "s1");
        let claim_id = claim.id_reclamacion;
        let filter = PreviousClaimFilter {
            id_session: "s1".into(),
            tipo_accion: ClaimKind::ReclamacionEps,
            below_level: 1,
        };
        store
            .append_claim(&key(), claim, &filter, ClaimState::Escalado)
            .unwrap();

        // Unfiled claims do not count.
        let report =
            validate_escalation_requirements(&store, &key(), ClaimKind::ReclamacionSupersalud)
                .unwrap();
        assert!(!report.can_escalate);

        store
            .update_claim(
                &key(),
                claim_id,
                ClaimUpdate::Filed {
                    numero_radicado: "EPS-1".into(),
                    fecha_radicacion: chrono::NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
                },
            )
            .unwrap();
        for kind in [ClaimKind::ReclamacionSupersalud, ClaimKind::Tutela] {
            let report = validate_escalation_requirements(&store, &key(), kind).unwrap();
            assert!(report.can_escalate, "{kind} should be allowed");
            assert!(report.missing.is_empty());
        }
    }

    #[test]
    fn desacato_needs_a_favorable_tutela_record() {
        let store = store();
        let report =
            validate_escalation_requirements(&store, &key(), ClaimKind::Desacato).unwrap();
        assert_eq!(report.missing, vec![REQ_TUTELA_FAVORABLE.to_string()]);

        store.save_tutela(&key(), favorable_tutela("t1")).unwrap();
        let report =
            validate_escalation_requirements(&store, &key(), ClaimKind::Desacato).unwrap();
        assert!(report.can_escalate);
    }

    #[test]
    fn eps_is_always_allowed() {
        let store = store();
        let report =
            validate_escalation_requirements(&store, &key(), ClaimKind::ReclamacionEps).unwrap();
        assert!(report.can_escalate);
    }

    #[test]
    fn unknown_patient_is_an_error() {
        let store = MemoryClaimStore::new();
        assert!(matches!(
            validate_escalation_requirements(&store, &key(), ClaimKind::Tutela),
            Err(ClaimError::PatientNotFound(_))
        ));
    }
}
