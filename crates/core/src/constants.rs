//! Constants used throughout the claims core crate.
//!
//! Storage names, default settings and the fixed lookup tables that are not part of the
//! escalation ladder itself.

/// Default directory for claim data when no explicit directory is configured.
pub const DEFAULT_CLAIMS_DATA_DIR: &str = "claims_data";

/// Directory name for patient records under the claims data directory.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Filename for the patient record (identity, prescriptions, claims).
pub const PATIENT_JSON_FILENAME: &str = "patient.json";

/// Filename for the append-only tutela records of a patient.
pub const TUTELAS_JSON_FILENAME: &str = "tutelas.json";

/// Default location of the prompt catalog.
pub const DEFAULT_PROMPTS_FILE: &str = "prompts/claims.yaml";

/// Default exactly-once window for external event ids.
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 60;

/// Default bound on a single text generation call.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 60;

/// Colombia runs on UTC-5 all year.
pub const COLOMBIA_UTC_OFFSET_SECS: i32 = -5 * 3600;

/// Name and email used for commits in patient repositories.
pub const COMMIT_AUTHOR_NAME: &str = "nme-claims";
pub const COMMIT_AUTHOR_EMAIL: &str = "claims@nomeentregaron.invalid";

/// Fields a tutela record must carry before a desacato can be drafted, in collection order.
pub const REQUIRED_TUTELA_FIELDS: [&str; 5] = [
    "numero_sentencia",
    "fecha_sentencia",
    "fecha_radicacion_tutela",
    "juzgado",
    "ciudad",
];

/// Fallback text used in prompts when the prescription carries no diagnosis.
pub const DIAGNOSIS_PLACEHOLDER: &str = "No especificado en la prescripción";

/// Addressee of Supersalud complaints.
pub const SUPERSALUD_NAME: &str = "Superintendencia Nacional de Salud";

/// Addressee of tutela filings.
pub const TUTELA_ADDRESSEE: &str = "Juzgado de Tutela";
