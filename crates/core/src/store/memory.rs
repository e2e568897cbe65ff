//! In-process claim store.
//!
//! Every mutation runs on a clone of the patient record and is swapped in under the write
//! lock only when it fully succeeds. Faults can be injected at named points to check that a
//! failed write leaves the record untouched.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use nme_types::PatientKey;
use uuid::Uuid;

use super::{AppendOutcome, PatientClaimStore};
use crate::model::{
    apply_append, apply_update, ClaimRecord, ClaimState, ClaimUpdate, Patient,
    PreviousClaimFilter, Prescription, TutelaRecord,
};
use crate::{ClaimError, ClaimResult};

/// Places where a write can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// After the new claim is appended, before earlier claims are flipped.
    BetweenAppendAndFlip,
    /// Before any claim update is applied.
    BeforeUpdate,
}

#[derive(Default)]
pub struct MemoryClaimStore {
    patients: RwLock<HashMap<PatientKey, Patient>>,
    tutelas: RwLock<HashMap<PatientKey, Vec<TutelaRecord>>>,
    faults: Mutex<HashSet<FaultPoint>>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next writes fail at `point` until [`MemoryClaimStore::clear_faults`] is called.
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    fn check_fault(&self, point: FaultPoint) -> ClaimResult<()> {
        let faults = self.faults.lock().map_err(|_| ClaimError::LockPoisoned)?;
        if faults.contains(&point) {
            return Err(ClaimError::InjectedFault(match point {
                FaultPoint::BetweenAppendAndFlip => "between append and flip",
                FaultPoint::BeforeUpdate => "before update",
            }));
        }
        Ok(())
    }

    /// Run `mutate` on a copy of the patient and store the copy if it succeeds.
    fn modify<T>(
        &self,
        key: &PatientKey,
        mutate: impl FnOnce(&mut Patient) -> ClaimResult<T>,
    ) -> ClaimResult<T> {
        let mut patients = self.patients.write().map_err(|_| ClaimError::LockPoisoned)?;
        let current = patients
            .get(key)
            .ok_or_else(|| ClaimError::PatientNotFound(key.to_string()))?;
        let mut working = current.clone();
        let value = mutate(&mut working)?;
        patients.insert(key.clone(), working);
        Ok(value)
    }
}

impl PatientClaimStore for MemoryClaimStore {
    fn register_patient(&self, patient: Patient) -> ClaimResult<()> {
        let mut patients = self.patients.write().map_err(|_| ClaimError::LockPoisoned)?;
        if patients.contains_key(&patient.paciente_clave) {
            return Err(ClaimError::PatientAlreadyExists(
                patient.paciente_clave.to_string(),
            ));
        }
        patients.insert(patient.paciente_clave.clone(), patient);
        Ok(())
    }

    fn add_prescription(&self, key: &PatientKey, prescription: Prescription) -> ClaimResult<()> {
        self.modify(key, |patient| {
            patient.prescripciones.push(prescription);
            Ok(())
        })
    }

    fn find_patient_by_session(&self, session_id: &str) -> ClaimResult<Option<PatientKey>> {
        let patients = self.patients.read().map_err(|_| ClaimError::LockPoisoned)?;
        let by_prescription = patients
            .values()
            .find(|p| p.prescripciones.iter().any(|r| r.id_session == session_id));
        let found = by_prescription.or_else(|| {
            patients
                .values()
                .find(|p| p.reclamaciones.iter().any(|c| c.id_session == session_id))
        });
        Ok(found.map(|p| p.paciente_clave.clone()))
    }

    fn get_patient(&self, key: &PatientKey) -> ClaimResult<Option<Patient>> {
        let patients = self.patients.read().map_err(|_| ClaimError::LockPoisoned)?;
        Ok(patients.get(key).cloned())
    }

    fn append_claim(
        &self,
        key: &PatientKey,
        claim: ClaimRecord,
        previous: &PreviousClaimFilter,
        previous_new_state: ClaimState,
    ) -> ClaimResult<AppendOutcome> {
        let claim_id = claim.id_reclamacion;
        let flipped = self.modify(key, |patient| {
            apply_append(patient, claim, previous, previous_new_state, || {
                self.check_fault(FaultPoint::BetweenAppendAndFlip)
            })
        })?;
        Ok(AppendOutcome { claim_id, flipped })
    }

    fn update_claim(
        &self,
        key: &PatientKey,
        claim_id: Uuid,
        update: ClaimUpdate,
    ) -> ClaimResult<ClaimRecord> {
        self.check_fault(FaultPoint::BeforeUpdate)?;
        self.modify(key, |patient| apply_update(patient, claim_id, &update))
    }

    fn save_tutela(&self, key: &PatientKey, record: TutelaRecord) -> ClaimResult<()> {
        if !self
            .patients
            .read()
            .map_err(|_| ClaimError::LockPoisoned)?
            .contains_key(key)
        {
            return Err(ClaimError::PatientNotFound(key.to_string()));
        }
        let mut tutelas = self.tutelas.write().map_err(|_| ClaimError::LockPoisoned)?;
        let records = tutelas.entry(key.clone()).or_default();
        if records.iter().any(|t| t.tutela_id == record.tutela_id) {
            return Err(ClaimError::TutelaAlreadyExists(record.tutela_id));
        }
        records.push(record);
        Ok(())
    }

    fn tutelas(&self, key: &PatientKey) -> ClaimResult<Vec<TutelaRecord>> {
        let tutelas = self.tutelas.read().map_err(|_| ClaimError::LockPoisoned)?;
        Ok(tutelas.get(key).cloned().unwrap_or_default())
    }

    fn list_patients(&self) -> ClaimResult<Vec<PatientKey>> {
        let patients = self.patients.read().map_err(|_| ClaimError::LockPoisoned)?;
        let mut keys: Vec<PatientKey> = patients.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
