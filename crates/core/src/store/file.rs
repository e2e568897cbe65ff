//! Git-backed claim store.
//!
//! Each patient lives in its own repository under the sharded layout:
//!
//! ```text
//! <claims_data_dir>/patients/<s1>/<s2>/<storage_id>/
//!     patient.json
//!     tutelas.json
//! ```
//!
//! where `storage_id` is the SHA-256 of the patient key and `s1`/`s2` are its first four hex
//! characters. Every mutation reads the current file, applies the change to a copy, and writes
//! and commits the result in a single commit. A failed commit restores the previous contents.
//! Files are replaced by rename, so a reader never sees a partially written file. Writers and
//! keyed readers of the same patient are serialised by a per-key lock, so reads never observe a
//! write that is later rolled back.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nme_types::PatientKey;
use uuid::Uuid;

use super::{AppendOutcome, PatientClaimStore};
use crate::config::CoreConfig;
use crate::constants::{PATIENT_JSON_FILENAME, TUTELAS_JSON_FILENAME};
use crate::model::{
    apply_append, apply_update, ClaimRecord, ClaimState, ClaimUpdate, Patient,
    PreviousClaimFilter, Prescription, TutelaRecord,
};
use crate::versioned_files::{
    CommitAction, CommitDomain, CommitMessage, FileToWrite, VersionedFileService,
};
use crate::{ClaimError, ClaimResult};

pub struct FileClaimStore {
    cfg: Arc<CoreConfig>,
    /// One entry per patient touched since startup. Entries are never removed, so an `Arc`
    /// handed out by `key_lock` stays the only lock for its key.
    locks: Mutex<HashMap<PatientKey, Arc<Mutex<()>>>>,
}

impl FileClaimStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn patient_dir(&self, key: &PatientKey) -> PathBuf {
        key.sharded_dir(&self.cfg.patients_dir())
    }

    fn key_lock(&self, key: &PatientKey) -> ClaimResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| ClaimError::LockPoisoned)?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Read the patient while holding its key lock.
    fn read_patient_locked(&self, key: &PatientKey) -> ClaimResult<Option<Patient>> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| ClaimError::LockPoisoned)?;
        Ok(Self::read_patient_file(&self.patient_dir(key))?.map(|(_, p)| p))
    }

    fn read_patient_file(dir: &Path) -> ClaimResult<Option<(String, Patient)>> {
        let path = dir.join(PATIENT_JSON_FILENAME);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(ClaimError::FileRead)?;
        let patient: Patient = serde_json::from_str(&raw).map_err(ClaimError::Deserialization)?;
        Ok(Some((raw, patient)))
    }

    fn read_tutelas_file(dir: &Path) -> ClaimResult<(Option<String>, Vec<TutelaRecord>)> {
        let path = dir.join(TUTELAS_JSON_FILENAME);
        if !path.is_file() {
            return Ok((None, Vec::new()));
        }
        let raw = fs::read_to_string(&path).map_err(ClaimError::FileRead)?;
        let records = serde_json::from_str(&raw).map_err(ClaimError::Deserialization)?;
        Ok((Some(raw), records))
    }

    /// Read the patient, run `mutate` on a copy, and commit the copy.
    fn modify<T>(
        &self,
        key: &PatientKey,
        summary: &str,
        mutate: impl FnOnce(&mut Patient) -> ClaimResult<T>,
    ) -> ClaimResult<T> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| ClaimError::LockPoisoned)?;

        let dir = self.patient_dir(key);
        let (raw, current) = Self::read_patient_file(&dir)?
            .ok_or_else(|| ClaimError::PatientNotFound(key.to_string()))?;

        let mut working = current;
        let value = mutate(&mut working)?;

        let content = serde_json::to_string_pretty(&working).map_err(ClaimError::Serialization)?;
        let msg = CommitMessage::new(CommitDomain::Claim, CommitAction::Update, summary)?;
        VersionedFileService::write_and_commit_files(
            &dir,
            &msg,
            &[FileToWrite {
                relative_path: Path::new(PATIENT_JSON_FILENAME),
                content: &content,
                old_content: Some(&raw),
            }],
        )?;
        Ok(value)
    }

    /// Every parseable patient under the sharded directory tree, read without key locks.
    ///
    /// Files that cannot be read or parsed are logged and skipped. Callers confirm what they
    /// find with [`Self::read_patient_locked`].
    fn load_all(&self) -> Vec<Patient> {
        let mut patients = Vec::new();
        let Ok(s1_iter) = fs::read_dir(self.cfg.patients_dir()) else {
            return patients;
        };
        for s1 in s1_iter.flatten() {
            let Ok(s2_iter) = fs::read_dir(s1.path()) else {
                continue;
            };
            for s2 in s2_iter.flatten() {
                let Ok(id_iter) = fs::read_dir(s2.path()) else {
                    continue;
                };
                for id_ent in id_iter.flatten() {
                    let id_path = id_ent.path();
                    if !id_path.is_dir() {
                        continue;
                    }
                    match Self::read_patient_file(&id_path) {
                        Ok(Some((_, patient))) => patients.push(patient),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                "failed to load patient file in {}: {}",
                                id_path.display(),
                                e
                            );
                        }
                    }
                }
            }
        }
        patients
    }
}

impl PatientClaimStore for FileClaimStore {
    fn register_patient(&self, patient: Patient) -> ClaimResult<()> {
        let key = patient.paciente_clave.clone();
        let lock = self.key_lock(&key)?;
        let _guard = lock.lock().map_err(|_| ClaimError::LockPoisoned)?;

        let dir = self.patient_dir(&key);
        if dir.join(PATIENT_JSON_FILENAME).exists() {
            return Err(ClaimError::PatientAlreadyExists(key.to_string()));
        }
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(ClaimError::StorageDirCreation)?;
        }

        let content = serde_json::to_string_pretty(&patient).map_err(ClaimError::Serialization)?;
        let msg = CommitMessage::new(CommitDomain::Patient, CommitAction::Create, "register patient")?;
        VersionedFileService::init_and_commit(
            &dir,
            &msg,
            &[
                FileToWrite {
                    relative_path: Path::new(PATIENT_JSON_FILENAME),
                    content: &content,
                    old_content: None,
                },
                FileToWrite {
                    relative_path: Path::new(TUTELAS_JSON_FILENAME),
                    content: "[]",
                    old_content: None,
                },
            ],
        )?;
        tracing::info!("registered patient in {}", dir.display());
        Ok(())
    }

    fn add_prescription(&self, key: &PatientKey, prescription: Prescription) -> ClaimResult<()> {
        self.modify(key, "add prescription", |patient| {
            patient.prescripciones.push(prescription);
            Ok(())
        })
    }

    fn find_patient_by_session(&self, session_id: &str) -> ClaimResult<Option<PatientKey>> {
        let patients = self.load_all();
        let by_prescription = patients
            .iter()
            .find(|p| p.prescripciones.iter().any(|r| r.id_session == session_id));
        let found = by_prescription.or_else(|| {
            patients
                .iter()
                .find(|p| p.reclamaciones.iter().any(|c| c.id_session == session_id))
        });
        let Some(candidate) = found.map(|p| p.paciente_clave.clone()) else {
            return Ok(None);
        };
        let confirmed = self
            .read_patient_locked(&candidate)?
            .is_some_and(|p| p.references_session(session_id));
        Ok(confirmed.then_some(candidate))
    }

    fn get_patient(&self, key: &PatientKey) -> ClaimResult<Option<Patient>> {
        self.read_patient_locked(key)
    }

    fn append_claim(
        &self,
        key: &PatientKey,
        claim: ClaimRecord,
        previous: &PreviousClaimFilter,
        previous_new_state: ClaimState,
    ) -> ClaimResult<AppendOutcome> {
        let claim_id = claim.id_reclamacion;
        let summary = format!("append {} level {}", claim.tipo_accion, claim.nivel_escalamiento);
        let flipped = self.modify(key, &summary, |patient| {
            apply_append(patient, claim, previous, previous_new_state, || Ok(()))
        })?;
        Ok(AppendOutcome { claim_id, flipped })
    }

    fn update_claim(
        &self,
        key: &PatientKey,
        claim_id: Uuid,
        update: ClaimUpdate,
    ) -> ClaimResult<ClaimRecord> {
        let summary = match &update {
            ClaimUpdate::DocumentUrl(_) => "attach document",
            ClaimUpdate::Filed { .. } => "record filing",
            ClaimUpdate::Resolved => "mark resolved",
        };
        self.modify(key, summary, |patient| apply_update(patient, claim_id, &update))
    }

    fn save_tutela(&self, key: &PatientKey, record: TutelaRecord) -> ClaimResult<()> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| ClaimError::LockPoisoned)?;

        let dir = self.patient_dir(key);
        if !dir.join(PATIENT_JSON_FILENAME).is_file() {
            return Err(ClaimError::PatientNotFound(key.to_string()));
        }
        let (raw, mut records) = Self::read_tutelas_file(&dir)?;
        if records.iter().any(|t| t.tutela_id == record.tutela_id) {
            return Err(ClaimError::TutelaAlreadyExists(record.tutela_id));
        }
        records.push(record);

        let content = serde_json::to_string_pretty(&records).map_err(ClaimError::Serialization)?;
        let msg = CommitMessage::new(CommitDomain::Tutela, CommitAction::Create, "record ruling")?;
        VersionedFileService::write_and_commit_files(
            &dir,
            &msg,
            &[FileToWrite {
                relative_path: Path::new(TUTELAS_JSON_FILENAME),
                content: &content,
                old_content: raw.as_deref(),
            }],
        )
    }

    fn tutelas(&self, key: &PatientKey) -> ClaimResult<Vec<TutelaRecord>> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| ClaimError::LockPoisoned)?;
        Ok(Self::read_tutelas_file(&self.patient_dir(key))?.1)
    }

    fn list_patients(&self) -> ClaimResult<Vec<PatientKey>> {
        let mut keys = Vec::new();
        for patient in self.load_all() {
            let key = patient.paciente_clave;
            if self.read_patient_locked(&key)?.is_some() {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
