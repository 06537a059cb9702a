use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use populate_core::{
    BatchRows, DatasetCounts, EntityKind, PersistedKey, RecordKey, RecordStore, StoreError,
    StoreResult,
};

use crate::options::StoreOptions;

mod errors;
mod queries;

use errors::classify;

/// Store backed by the serving application's PostgreSQL tables.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    postgis: bool,
}

impl PostgresStore {
    /// Create a new store using a pre-configured pool.
    pub fn new(pool: PgPool, postgis: bool) -> Self {
        Self { pool, postgis }
    }

    pub async fn connect(database_url: &str, opts: &StoreOptions) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .acquire_timeout(opts.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(classify)?;
        Ok(Self::new(pool, opts.postgis))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the three tables (and the PostGIS column when enabled) if absent,
    /// and give existing tables the unique `external_id` the upserts rely on.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let mut statements = vec![
            queries::CREATE_USER_TABLE,
            queries::CREATE_APPLIER_TABLE,
            queries::CREATE_QUESTION_TABLE,
        ];
        statements.extend_from_slice(queries::ENSURE_NATURAL_KEYS);
        statements.extend_from_slice(queries::CREATE_FOREIGN_KEY_INDEXES);
        if self.postgis {
            statements.extend_from_slice(queries::ENABLE_POSTGIS);
        }

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(classify)?;
        }
        info!(postgis = self.postgis, "schema ready");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    fn max_batch_rows(&self, kind: EntityKind) -> usize {
        let binds = match kind {
            EntityKind::User => queries::USER_BINDS,
            EntityKind::Applier if self.postgis => queries::APPLIER_BINDS_POSTGIS,
            EntityKind::Applier => queries::APPLIER_BINDS,
            EntityKind::Question => queries::QUESTION_BINDS,
        };
        queries::MAX_BIND_PARAMS / binds
    }

    async fn insert(&self, rows: BatchRows<'_>) -> StoreResult<Vec<PersistedKey>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let returned = match rows {
            BatchRows::Users(rows) => queries::insert_users(&self.pool, rows).await,
            BatchRows::Appliers(rows) => {
                queries::insert_appliers(&self.pool, rows, self.postgis).await
            }
            BatchRows::Questions(rows) => queries::insert_questions(&self.pool, rows).await,
        }
        .map_err(classify)?;
        debug!(table = %rows.kind(), rows = returned.len(), "batch inserted");

        returned
            .into_iter()
            .map(|(id, external_id)| {
                let key = RecordKey::new(id).map_err(|err| StoreError::Fatal(err.to_string()))?;
                Ok(PersistedKey { external_id, key })
            })
            .collect()
    }

    async fn reset(&self) -> StoreResult<()> {
        sqlx::query(queries::TRUNCATE_ALL)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        info!("dataset tables truncated");
        Ok(())
    }

    async fn counts(&self) -> StoreResult<DatasetCounts> {
        let (users, appliers, questions) = sqlx::query_as::<_, (i64, i64, i64)>(queries::COUNT_ALL)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(DatasetCounts {
            users: users.max(0) as u64,
            appliers: appliers.max(0) as u64,
            questions: questions.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_limits_follow_bind_parameter_cap() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/populate")
            .expect("lazy pool");
        let store = PostgresStore::new(pool.clone(), false);
        assert_eq!(store.max_batch_rows(EntityKind::User), 65_535 / 8);
        assert_eq!(store.max_batch_rows(EntityKind::Applier), 65_535 / 6);

        let spatial = PostgresStore::new(pool, true);
        assert_eq!(spatial.max_batch_rows(EntityKind::Applier), 65_535 / 8);
        assert!(spatial.max_batch_rows(EntityKind::Question) >= 5_000);
    }
}
