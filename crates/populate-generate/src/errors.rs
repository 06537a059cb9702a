use thiserror::Error;

use populate_core::EntityKind;

/// Errors emitted by the generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error(
        "failed to persist {phase} after {attempts} attempt(s) with {persisted} record(s) persisted: {message}"
    )]
    StorageWrite {
        phase: EntityKind,
        persisted: u64,
        attempts: u32,
        message: String,
    },
    #[error("interrupted during {phase} with {persisted} record(s) persisted")]
    Interrupted { phase: EntityKind, persisted: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl GenerationError {
    /// Phase and persisted count at which the run halted, if it halted mid-phase.
    pub fn halted_at(&self) -> Option<(EntityKind, u64)> {
        match self {
            GenerationError::StorageWrite {
                phase, persisted, ..
            }
            | GenerationError::Interrupted { phase, persisted } => Some((*phase, *persisted)),
            _ => None,
        }
    }
}

impl From<populate_core::Error> for GenerationError {
    fn from(err: populate_core::Error) -> Self {
        match err {
            populate_core::Error::InvalidReference(message) => {
                GenerationError::InvalidReference(message)
            }
            populate_core::Error::InvalidRecord(message) => GenerationError::InvalidRecord(message),
        }
    }
}
