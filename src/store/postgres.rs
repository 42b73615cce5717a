use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{AccountKey, RecordStore, StoreError, StoredRecord, Write, WriteBatch, RECORD_VERSION};

/// Postgres-backed store: one row per account in `oracle_accounts`
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Connect and make sure the accounts table exists
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oracle_accounts (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                version INTEGER NOT NULL,
                body JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&db_pool)
        .await?;

        Ok(Self::new(db_pool))
    }

    fn decode_row(version: i32, body: serde_json::Value) -> Result<StoredRecord, StoreError> {
        if version != i32::from(RECORD_VERSION) {
            return Err(StoreError::UnsupportedVersion(version as u16));
        }
        Ok(StoredRecord {
            version: RECORD_VERSION,
            body: serde_json::from_value(body)?,
        })
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn read(&self, key: AccountKey) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query_as::<_, (i32, serde_json::Value)>(
            "SELECT version, body FROM oracle_accounts WHERE key = $1",
        )
        .bind(key.as_storage_key())
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(|(version, body)| Self::decode_row(version, body))
            .transpose()
    }

    async fn scan(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let rows = sqlx::query_as::<_, (i32, serde_json::Value)>(
            "SELECT version, body FROM oracle_accounts",
        )
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|(version, body)| Self::decode_row(version, body))
            .collect()
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.db_pool.begin().await?;

        for write in &batch.writes {
            let record = write.record();
            let key = record.key();
            let body = serde_json::to_value(&record.body)?;

            let affected = match write {
                Write::Create(_) => sqlx::query(
                    r#"
                    INSERT INTO oracle_accounts (key, kind, version, body, updated_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (key) DO NOTHING
                    "#,
                )
                .bind(key.as_storage_key())
                .bind(key.kind())
                .bind(i32::from(record.version))
                .bind(body)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?
                .rows_affected(),
                Write::Update(_) => sqlx::query(
                    r#"
                    UPDATE oracle_accounts
                    SET version = $2, body = $3, updated_at = $4
                    WHERE key = $1
                    "#,
                )
                .bind(key.as_storage_key())
                .bind(i32::from(record.version))
                .bind(body)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?
                .rows_affected(),
            };

            if affected != 1 {
                // Dropping the transaction rolls back earlier writes in the batch.
                return Err(match write {
                    Write::Create(_) => StoreError::AlreadyExists(key.as_storage_key()),
                    Write::Update(_) => StoreError::Missing(key.as_storage_key()),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
