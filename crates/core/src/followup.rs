//! Follow-up scheduling for filed claims.
//!
//! A filed claim gets a review date of `fecha_radicacion + dias_revision`, where
//! `dias_revision` is the review window the rule engine chose when the claim was generated.
//! The scheduler asks for every claim whose review date has arrived.

use chrono::{Days, FixedOffset, NaiveDate, Utc};
use nme_types::PatientKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::COLOMBIA_UTC_OFFSET_SECS;
use crate::model::{ClaimKind, ClaimRecord, ClaimState, ClaimUpdate};
use crate::store::PatientClaimStore;
use crate::ClaimResult;

/// Today's calendar date in Colombia.
pub fn colombia_today() -> NaiveDate {
    let now = Utc::now();
    match FixedOffset::east_opt(COLOMBIA_UTC_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}

/// Review date for a claim filed on `filed_on`.
pub fn review_date(filed_on: NaiveDate, review_days: u32) -> NaiveDate {
    filed_on
        .checked_add_days(Days::new(u64::from(review_days)))
        .unwrap_or(NaiveDate::MAX)
}

/// A filed claim waiting on a follow-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueReview {
    pub patient_key: PatientKey,
    pub claim_id: Uuid,
    pub tipo_accion: ClaimKind,
    pub nivel_escalamiento: u32,
    pub numero_radicado: String,
    pub fecha_revision: NaiveDate,
    pub id_session: String,
}

fn due_review(key: &PatientKey, claim: &ClaimRecord, today: NaiveDate) -> Option<DueReview> {
    if claim.estado_reclamacion != ClaimState::Radicado {
        return None;
    }
    let fecha_revision = claim.fecha_revision?;
    (fecha_revision <= today).then(|| DueReview {
        patient_key: key.clone(),
        claim_id: claim.id_reclamacion,
        tipo_accion: claim.tipo_accion,
        nivel_escalamiento: claim.nivel_escalamiento,
        numero_radicado: claim.numero_radicado.clone(),
        fecha_revision,
        id_session: claim.id_session.clone(),
    })
}

/// Filed claims across all patients whose review date is on or before `today`.
///
/// Only each patient's latest claim is considered, and resolved patients are skipped.
pub fn claims_due_for_review(
    store: &dyn PatientClaimStore,
    today: NaiveDate,
) -> ClaimResult<Vec<DueReview>> {
    let mut due = Vec::new();
    for key in store.list_patients()? {
        let Some(patient) = store.get_patient(&key)? else {
            continue;
        };
        if patient.is_resolved() {
            continue;
        }
        if let Some(review) = patient
            .last_claim()
            .and_then(|claim| due_review(&key, claim, today))
        {
            due.push(review);
        }
    }
    due.sort_by(|a, b| a.fecha_revision.cmp(&b.fecha_revision));
    tracing::info!("{} claims due for review on {}", due.len(), today);
    Ok(due)
}

/// Record the filing number issued by the target entity.
///
/// Moves the claim to `radicado` and sets its review date.
pub fn record_filing(
    store: &dyn PatientClaimStore,
    key: &PatientKey,
    claim_id: Uuid,
    numero_radicado: &str,
    fecha_radicacion: NaiveDate,
) -> ClaimResult<ClaimRecord> {
    let updated = store.update_claim(
        key,
        claim_id,
        ClaimUpdate::Filed {
            numero_radicado: numero_radicado.to_string(),
            fecha_radicacion,
        },
    )?;
    tracing::info!(
        "claim {} of {} filed on {}, review on {:?}",
        claim_id,
        key,
        fecha_radicacion,
        updated.fecha_revision
    );
    Ok(updated)
}
