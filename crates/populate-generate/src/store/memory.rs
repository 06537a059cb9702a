use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use populate_core::{
    ApplierRecord, BatchRows, DatasetCounts, EntityKind, PersistedKey, QuestionRecord, Record,
    RecordKey, RecordStore, StoreError, StoreResult, UserRecord, validate_applier,
    validate_question, validate_user,
};

/// Failure injected into a specific insert call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Reject the call without persisting anything.
    Reject(StoreError),
    /// Persist the batch, then report the error (a lost acknowledgement).
    CommitThenReject(StoreError),
}

struct Table<T> {
    rows: Vec<T>,
    by_external: HashMap<String, RecordKey>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            by_external: HashMap::new(),
        }
    }
}

impl<T: Record> Table<T> {
    fn contains(&self, key: RecordKey) -> bool {
        usize::try_from(key.get()).is_ok_and(|index| index <= self.rows.len())
    }

    fn insert_all(&mut self, rows: &[T]) -> StoreResult<Vec<PersistedKey>> {
        let mut persisted = Vec::with_capacity(rows.len());
        for row in rows {
            let key = match self.by_external.get(row.external_id()) {
                Some(key) => *key,
                None => {
                    self.rows.push(row.clone());
                    let key = RecordKey::new(self.rows.len() as i64)
                        .map_err(|err| StoreError::Fatal(err.to_string()))?;
                    self.by_external.insert(row.external_id().to_string(), key);
                    key
                }
            };
            persisted.push(PersistedKey {
                external_id: row.external_id().to_string(),
                key,
            });
        }
        Ok(persisted)
    }
}

#[derive(Default)]
struct State {
    users: Table<UserRecord>,
    appliers: Table<ApplierRecord>,
    questions: Table<QuestionRecord>,
    calls: u64,
    batch_sizes: Vec<(EntityKind, usize)>,
    faults: HashMap<u64, Fault>,
}

/// Transactional in-process store with keys assigned from 1 per kind.
///
/// Each insert validates every row and parent reference before applying
/// anything, so a rejected batch leaves no partial state behind.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    max_batch_rows: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a per-insert row limit, like a real engine's bind cap.
    pub fn with_max_batch_rows(mut self, limit: usize) -> Self {
        self.max_batch_rows = Some(limit);
        self
    }

    /// Inject `fault` into the `call`-th insert (1-based, counted across kinds).
    pub fn fail_call(&self, call: u64, fault: Fault) {
        self.lock().faults.insert(call, fault);
    }

    /// Number of insert calls received, including rejected ones.
    pub fn insert_calls(&self) -> u64 {
        self.lock().calls
    }

    /// Row count of every insert call, in arrival order.
    pub fn batch_sizes(&self, kind: EntityKind) -> Vec<usize> {
        self.lock()
            .batch_sizes
            .iter()
            .filter(|(batch_kind, _)| *batch_kind == kind)
            .map(|(_, rows)| *rows)
            .collect()
    }

    pub fn users(&self) -> Vec<UserRecord> {
        self.lock().users.rows.clone()
    }

    pub fn appliers(&self) -> Vec<ApplierRecord> {
        self.lock().appliers.rows.clone()
    }

    pub fn questions(&self) -> Vec<QuestionRecord> {
        self.lock().questions.rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_now(&self, rows: BatchRows<'_>) -> StoreResult<Vec<PersistedKey>> {
        let mut state = self.lock();
        state.calls += 1;
        let call = state.calls;
        state.batch_sizes.push((rows.kind(), rows.len()));

        let fault = state.faults.remove(&call);
        if let Some(Fault::Reject(err)) = fault {
            return Err(err);
        }

        let persisted = match rows {
            BatchRows::Users(rows) => {
                for row in rows {
                    validate_user(row).map_err(|err| StoreError::Fatal(err.to_string()))?;
                }
                state.users.insert_all(rows)?
            }
            BatchRows::Appliers(rows) => {
                for row in rows {
                    validate_applier(row).map_err(|err| StoreError::Fatal(err.to_string()))?;
                    if !state.users.contains(row.user_id) {
                        return Err(dangling(EntityKind::Applier, row.user_id));
                    }
                }
                state.appliers.insert_all(rows)?
            }
            BatchRows::Questions(rows) => {
                for row in rows {
                    validate_question(row).map_err(|err| StoreError::Fatal(err.to_string()))?;
                    if !state.appliers.contains(row.application_id) {
                        return Err(dangling(EntityKind::Question, row.application_id));
                    }
                }
                state.questions.insert_all(rows)?
            }
        };

        match fault {
            Some(Fault::CommitThenReject(err)) => Err(err),
            _ => Ok(persisted),
        }
    }
}

fn dangling(kind: EntityKind, key: RecordKey) -> StoreError {
    StoreError::Fatal(format!(
        "foreign key violation: {kind} row references missing parent {key}"
    ))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    fn max_batch_rows(&self, _kind: EntityKind) -> usize {
        self.max_batch_rows.unwrap_or(usize::MAX)
    }

    async fn insert(&self, rows: BatchRows<'_>) -> StoreResult<Vec<PersistedKey>> {
        self.insert_now(rows)
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut state = self.lock();
        state.users = Table::default();
        state.appliers = Table::default();
        state.questions = Table::default();
        Ok(())
    }

    async fn counts(&self) -> StoreResult<DatasetCounts> {
        let state = self.lock();
        Ok(DatasetCounts {
            users: state.users.rows.len() as u64,
            appliers: state.appliers.rows.len() as u64,
            questions: state.questions.rows.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::factory::RecordFactory;

    fn key(value: i64) -> RecordKey {
        RecordKey::new(value).expect("key")
    }

    #[tokio::test]
    async fn reinserting_returns_existing_keys() {
        let store = InMemoryStore::new();
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let users: Vec<UserRecord> = (1..=3).map(|i| factory.user(i, &mut rng)).collect();

        let first = store.insert(BatchRows::Users(&users)).await.expect("insert");
        let second = store.insert(BatchRows::Users(&users)).await.expect("reinsert");
        assert_eq!(first, second);
        assert_eq!(store.counts().await.expect("counts").users, 3);
    }

    #[tokio::test]
    async fn dangling_parent_rejects_the_whole_batch() {
        let store = InMemoryStore::new();
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let users = vec![factory.user(1, &mut rng)];
        store.insert(BatchRows::Users(&users)).await.expect("insert");

        let appliers = vec![
            factory.applier(key(1), &mut rng),
            factory.applier(key(2), &mut rng),
        ];
        let err = store
            .insert(BatchRows::Appliers(&appliers))
            .await
            .expect_err("dangling user");
        assert!(!err.is_transient());
        assert_eq!(store.counts().await.expect("counts").appliers, 0);
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let store = InMemoryStore::new();
        store.fail_call(1, Fault::Reject(StoreError::Transient("reset".to_string())));
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let users = vec![factory.user(1, &mut rng)];

        assert!(store.insert(BatchRows::Users(&users)).await.is_err());
        assert!(store.insert(BatchRows::Users(&users)).await.is_ok());
        assert_eq!(store.insert_calls(), 2);
        assert_eq!(store.users().len(), 1);
    }
}
