use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{ApplierRecord, EntityKind, QuestionRecord, RecordKey, UserRecord};

/// One bulk insert worth of records of a single kind.
#[derive(Debug, Clone, Copy)]
pub enum BatchRows<'a> {
    Users(&'a [UserRecord]),
    Appliers(&'a [ApplierRecord]),
    Questions(&'a [QuestionRecord]),
}

impl<'a> BatchRows<'a> {
    pub fn kind(&self) -> EntityKind {
        match self {
            BatchRows::Users(_) => EntityKind::User,
            BatchRows::Appliers(_) => EntityKind::Applier,
            BatchRows::Questions(_) => EntityKind::Question,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BatchRows::Users(rows) => rows.len(),
            BatchRows::Appliers(rows) => rows.len(),
            BatchRows::Questions(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Natural keys of the rows, in input order.
    pub fn external_ids(&self) -> Vec<&'a str> {
        match self {
            BatchRows::Users(rows) => rows.iter().map(|row| row.external_id.as_str()).collect(),
            BatchRows::Appliers(rows) => rows.iter().map(|row| row.external_id.as_str()).collect(),
            BatchRows::Questions(rows) => {
                rows.iter().map(|row| row.external_id.as_str()).collect()
            }
        }
    }
}

/// Key a store assigned (or had already assigned) to a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedKey {
    pub external_id: String,
    pub key: RecordKey,
}

/// Row counts per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetCounts {
    pub users: u64,
    pub appliers: u64,
    pub questions: u64,
}

impl DatasetCounts {
    pub fn get(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::User => self.users,
            EntityKind::Applier => self.appliers,
            EntityKind::Question => self.questions,
        }
    }
}

/// Storage failures, split by whether resubmitting the batch can succeed.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Relational store the generator persists into.
///
/// `insert` must be all-or-nothing per call and idempotent per natural key:
/// a row whose `external_id` already exists is not inserted again, and its
/// existing key is returned instead.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Largest batch a single insert of `kind` may carry.
    fn max_batch_rows(&self, _kind: EntityKind) -> usize {
        usize::MAX
    }

    /// Persist every row of the batch and return one key per row.
    async fn insert(&self, rows: BatchRows<'_>) -> StoreResult<Vec<PersistedKey>>;

    /// Wipe the whole dataset.
    async fn reset(&self) -> StoreResult<()>;

    async fn counts(&self) -> StoreResult<DatasetCounts>;
}

/// Order persisted keys to match the input rows of a batch.
pub fn align_keys(rows: BatchRows<'_>, persisted: Vec<PersistedKey>) -> StoreResult<Vec<RecordKey>> {
    let mut by_external: HashMap<String, RecordKey> = persisted
        .into_iter()
        .map(|item| (item.external_id, item.key))
        .collect();

    rows.external_ids()
        .into_iter()
        .map(|external_id| {
            by_external.remove(external_id).ok_or_else(|| {
                StoreError::Fatal(format!(
                    "store returned no key for {} '{external_id}'",
                    rows.kind()
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ApplierSource, Coordinates, QualifiedStatus, SourceProduct};

    fn applier(external_id: &str) -> ApplierRecord {
        ApplierRecord {
            external_id: external_id.to_string(),
            user_id: RecordKey::new(1).expect("key"),
            source: ApplierSource {
                product: SourceProduct::Indeed,
                is_premium: false,
            },
            qualified: QualifiedStatus::Pending,
            coordinates: Coordinates::new(0.0, 0.0).expect("coords"),
        }
    }

    fn persisted(external_id: &str, key: i64) -> PersistedKey {
        PersistedKey {
            external_id: external_id.to_string(),
            key: RecordKey::new(key).expect("key"),
        }
    }

    #[test]
    fn align_keys_restores_input_order() {
        let rows = vec![applier("a"), applier("b"), applier("c")];
        let keys = align_keys(
            BatchRows::Appliers(&rows),
            vec![persisted("c", 30), persisted("a", 10), persisted("b", 20)],
        )
        .expect("align");
        let raw: Vec<i64> = keys.into_iter().map(RecordKey::get).collect();
        assert_eq!(raw, vec![10, 20, 30]);
    }

    #[test]
    fn align_keys_fails_on_missing_key() {
        let rows = vec![applier("a"), applier("b")];
        let err = align_keys(BatchRows::Appliers(&rows), vec![persisted("a", 1)])
            .expect_err("missing key");
        assert!(!err.is_transient());
    }
}
