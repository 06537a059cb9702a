use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::BatchRows;

/// Entity kinds of the three-level dataset, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Applier,
    Question,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Applier, EntityKind::Question];

    /// Phase name used in progress output, logs and reports.
    pub fn phase(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Applier => "appliers",
            EntityKind::Question => "screening_questions",
        }
    }

    /// The kind this kind references through its foreign key.
    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::User => None,
            EntityKind::Applier => Some(EntityKind::User),
            EntityKind::Question => Some(EntityKind::Applier),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase())
    }
}

/// Primary key assigned by a store. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RecordKey(i64);

impl RecordKey {
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(Error::InvalidReference(format!(
                "record key must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for RecordKey {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RecordKey> for i64 {
    fn from(key: RecordKey) -> Self {
        key.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Screening outcome of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualifiedStatus {
    Pending,
    Yes,
    No,
}

impl QualifiedStatus {
    pub const ALL: [QualifiedStatus; 3] = [
        QualifiedStatus::Pending,
        QualifiedStatus::Yes,
        QualifiedStatus::No,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QualifiedStatus::Pending => "PENDING",
            QualifiedStatus::Yes => "YES",
            QualifiedStatus::No => "NO",
        }
    }
}

impl fmt::Display for QualifiedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Text,
    Video,
    File,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [QuestionType::Text, QuestionType::Video, QuestionType::File];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Text => "TEXT",
            QuestionType::Video => "VIDEO",
            QuestionType::File => "FILE",
        }
    }
}

/// Job board an application came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceProduct {
    Indeed,
    LinkedIn,
    Internal,
}

impl SourceProduct {
    pub const ALL: [SourceProduct; 3] = [
        SourceProduct::Indeed,
        SourceProduct::LinkedIn,
        SourceProduct::Internal,
    ];
}

/// Provenance payload stored as JSON alongside an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplierSource {
    pub product: SourceProduct,
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
}

/// WGS84 point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coords = Self {
            latitude,
            longitude,
        };
        if !coords.is_valid() {
            return Err(Error::InvalidRecord(format!(
                "coordinates out of range: ({latitude}, {longitude})"
            )));
        }
        Ok(coords)
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A synthetic candidate identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub resume: String,
    pub cover_letter: String,
    pub country: String,
}

/// One application of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplierRecord {
    pub external_id: String,
    pub user_id: RecordKey,
    pub source: ApplierSource,
    pub qualified: QualifiedStatus,
    pub coordinates: Coordinates,
}

/// A screening question answered (or skipped) within an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub external_id: String,
    pub application_id: RecordKey,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub answer: String,
    pub is_skipped: bool,
}

/// Common surface of the three record types, used by the batch writer.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Generation-assigned natural key, unique per kind.
    fn external_id(&self) -> &str;

    /// Foreign key to the parent record, if the kind has one.
    fn parent_key(&self) -> Option<RecordKey>;

    fn batch(rows: &[Self]) -> BatchRows<'_>;
}

impl Record for UserRecord {
    const KIND: EntityKind = EntityKind::User;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn parent_key(&self) -> Option<RecordKey> {
        None
    }

    fn batch(rows: &[Self]) -> BatchRows<'_> {
        BatchRows::Users(rows)
    }
}

impl Record for ApplierRecord {
    const KIND: EntityKind = EntityKind::Applier;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn parent_key(&self) -> Option<RecordKey> {
        Some(self.user_id)
    }

    fn batch(rows: &[Self]) -> BatchRows<'_> {
        BatchRows::Appliers(rows)
    }
}

impl Record for QuestionRecord {
    const KIND: EntityKind = EntityKind::Question;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn parent_key(&self) -> Option<RecordKey> {
        Some(self.application_id)
    }

    fn batch(rows: &[Self]) -> BatchRows<'_> {
        BatchRows::Questions(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_rejects_non_positive_values() {
        assert!(RecordKey::new(0).is_err());
        assert!(RecordKey::new(-3).is_err());
        assert_eq!(RecordKey::new(7).expect("key").get(), 7);
    }

    #[test]
    fn record_key_deserialization_is_validated() {
        let err = serde_json::from_str::<RecordKey>("0");
        assert!(err.is_err());
        let key: RecordKey = serde_json::from_str("12").expect("parse key");
        assert_eq!(key.get(), 12);
    }

    #[test]
    fn coordinates_enforce_ranges() {
        assert!(Coordinates::new(90.0, -180.0).is_ok());
        assert!(Coordinates::new(90.000001, 0.0).is_err());
        assert!(Coordinates::new(0.0, 180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn entity_kinds_chain_to_their_parents() {
        assert_eq!(EntityKind::User.parent(), None);
        assert_eq!(EntityKind::Applier.parent(), Some(EntityKind::User));
        assert_eq!(EntityKind::Question.parent(), Some(EntityKind::Applier));
    }
}
