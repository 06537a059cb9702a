use thiserror::Error;

/// Core error type shared across populate crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A foreign key reference is missing, unexpected, or malformed.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    /// A record violates a field-level invariant.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Convenience alias for results returned by populate crates.
pub type Result<T> = std::result::Result<T, Error>;
