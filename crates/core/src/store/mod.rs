//! Patient claim store.
//!
//! The persistence contract used by the validator, generator and orchestrator. A patient's
//! record is the only shared mutable resource, and every mutation is linearizable per key:
//! implementations apply the change to a copy and commit it in one step.
//!
//! - [`memory::MemoryClaimStore`]: in-process store with fault injection.
//! - [`file::FileClaimStore`]: sharded JSON files under git, one repository per patient.

pub mod file;
pub mod memory;

use nme_types::PatientKey;
use uuid::Uuid;

use crate::model::{
    ClaimKind, ClaimRecord, ClaimState, ClaimUpdate, Patient, PreviousClaimFilter, Prescription,
    TutelaOutcome, TutelaRecord,
};
use crate::ClaimResult;

pub use file::FileClaimStore;
pub use memory::{FaultPoint, MemoryClaimStore};

/// What an append did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    pub claim_id: Uuid,
    /// Earlier claims moved to the requested state.
    pub flipped: usize,
}

pub trait PatientClaimStore: Send + Sync {
    /// Create a patient record. Fails with `PatientAlreadyExists` if the key is taken.
    fn register_patient(&self, patient: Patient) -> ClaimResult<()>;

    /// Append a prescription to the patient's `prescripciones`.
    fn add_prescription(&self, key: &PatientKey, prescription: Prescription) -> ClaimResult<()>;

    /// Resolve a chat session to its patient by searching prescriptions, then claims.
    fn find_patient_by_session(&self, session_id: &str) -> ClaimResult<Option<PatientKey>>;

    fn get_patient(&self, key: &PatientKey) -> ClaimResult<Option<Patient>>;

    /// Append `claim` and, in the same write, move every earlier claim matched by `previous`
    /// to `previous_new_state`. Either both happen or neither does.
    fn append_claim(
        &self,
        key: &PatientKey,
        claim: ClaimRecord,
        previous: &PreviousClaimFilter,
        previous_new_state: ClaimState,
    ) -> ClaimResult<AppendOutcome>;

    /// Apply a post-generation update (document URL, filing, resolution) to one claim.
    fn update_claim(
        &self,
        key: &PatientKey,
        claim_id: Uuid,
        update: ClaimUpdate,
    ) -> ClaimResult<ClaimRecord>;

    /// Record a tutela ruling. Records are immutable, so a repeated `tutela_id` is rejected.
    fn save_tutela(&self, key: &PatientKey, record: TutelaRecord) -> ClaimResult<()>;

    /// All tutela records of a patient in insertion order.
    fn tutelas(&self, key: &PatientKey) -> ClaimResult<Vec<TutelaRecord>>;

    fn list_patients(&self) -> ClaimResult<Vec<PatientKey>>;

    /// Claims of the given kinds that carry a filing number.
    fn get_prior_radicados(
        &self,
        key: &PatientKey,
        kinds: &[ClaimKind],
    ) -> ClaimResult<Vec<ClaimRecord>> {
        Ok(self
            .get_patient(key)?
            .map(|p| p.radicated_claims(kinds))
            .unwrap_or_default())
    }

    /// The favorable tutela with id `tutela_id`, or the most recent favorable one.
    fn get_favorable_tutela(
        &self,
        key: &PatientKey,
        tutela_id: Option<&str>,
    ) -> ClaimResult<Option<TutelaRecord>> {
        Ok(self
            .tutelas(key)?
            .into_iter()
            .rev()
            .filter(|t| t.resultado == TutelaOutcome::Favorable)
            .find(|t| tutela_id.map_or(true, |id| t.tutela_id == id)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{DeliveryStatus, Medication};

    /// A patient with every field a tutela needs and one undelivered medication.
    pub(crate) fn complete_patient(key: &str, tier: &str, session_id: &str) -> Patient {
        let mut patient = Patient::new(
            PatientKey::parse(key).unwrap(),
            "Ana María Pérez",
            "CC",
            "39287966",
        );
        patient.telefono_contacto = vec!["3001234567".into(), "3107654321".into()];
        patient.correo = vec!["ana@example.com".into()];
        patient.direccion = "Calle 10 # 20-30".into();
        patient.ciudad = "Medellín".into();
        patient.eps_estandarizada = "Nueva EPS".into();
        patient.farmacia = "Cruz Verde".into();
        patient.prescripciones.push(Prescription {
            id_session: session_id.into(),
            diagnostico: "Hipertensión arterial".into(),
            categoria_riesgo: tier.into(),
            fecha_atencion: None,
            url_prescripcion: String::new(),
            medicamentos: vec![
                Medication {
                    nombre: "Losartán 50 mg".into(),
                    dosis: "1 diaria".into(),
                    cantidad: "30".into(),
                    entregado: DeliveryStatus::NoEntregado,
                },
                Medication {
                    nombre: "Hidroclorotiazida".into(),
                    dosis: "1 diaria".into(),
                    cantidad: "30".into(),
                    entregado: DeliveryStatus::Entregado,
                },
            ],
        });
        patient
    }

    pub(crate) fn favorable_tutela(tutela_id: &str) -> TutelaRecord {
        TutelaRecord {
            tutela_id: tutela_id.into(),
            numero_sentencia: "T-05001-31-05-001-2025-10098-00".into(),
            fecha_sentencia: chrono::NaiveDate::from_ymd_opt(2025, 5, 28),
            fecha_radicacion_tutela: chrono::NaiveDate::from_ymd_opt(2025, 5, 15),
            juzgado: "Juzgado Primero Laboral del Circuito de Medellín".into(),
            ciudad: "Medellín".into(),
            resultado: TutelaOutcome::Favorable,
            created_at: chrono::Utc::now(),
        }
    }
}
