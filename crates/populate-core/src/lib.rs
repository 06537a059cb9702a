//! Core contracts for the applicant dataset populator.
//!
//! This crate defines the record types written by the generator, their
//! field-level invariants, and the storage boundary every backend implements.

pub mod error;
pub mod record;
pub mod redaction;
pub mod store;
pub mod validation;

pub use error::{Error, Result};
pub use record::{
    ApplierRecord, ApplierSource, Coordinates, EntityKind, QualifiedStatus, QuestionRecord,
    QuestionType, Record, RecordKey, SourceProduct, UserRecord,
};
pub use redaction::{RedactedUrl, redact_database_url};
pub use store::{
    BatchRows, DatasetCounts, PersistedKey, RecordStore, StoreError, StoreResult, align_keys,
};
pub use validation::{validate_applier, validate_question, validate_user};

/// Number of screening questions above which an applier counts as "heavy"
/// for the serving application's slow/optimized list views.
pub const QUESTION_THRESHOLD: u64 = 16;
