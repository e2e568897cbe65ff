#[allow(clippy::single_component_path_imports)]
use serde_yaml;

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("patient already exists: {0}")]
    PatientAlreadyExists(String),
    #[error("claim not found: {0}")]
    ClaimNotFound(uuid::Uuid),
    #[error("tutela already recorded: {0}")]
    TutelaAlreadyExists(String),
    #[error("claim {0} is already resolved")]
    ClaimAlreadyResolved(uuid::Uuid),
    #[error("escalation level {attempted} is below the current level {current}")]
    LevelRegression { current: u32, attempted: u32 },
    #[error("injected fault: {0}")]
    InjectedFault(&'static str),
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("text oracle unavailable: {0}")]
    Oracle(#[from] crate::oracle::OracleError),
    #[error("template error: {0}")]
    Template(#[from] crate::templates::TemplateError),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error(
        "initialise failed and cleanup also failed (path: {path}): init={init_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterInitialiseFailed {
        path: std::path::PathBuf,
        #[source]
        init_error: Box<ClaimError>,
        cleanup_error: std::io::Error,
    },
    #[error("failed to write claim file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read claim file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to deserialize YAML at {path}: {source}")]
    YamlDeserialization {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),
}

pub type ClaimResult<T> = std::result::Result<T, ClaimError>;
