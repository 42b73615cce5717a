use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AccountKey, RecordStore, StoreError, StoredRecord, Write, WriteBatch};

/// In-process store, used for tests and single-node runs without a database
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountKey, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read(&self, key: AccountKey) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.accounts.read().await.get(&key).cloned())
    }

    async fn scan(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;

        // Check the whole batch before touching the map.
        for write in &batch.writes {
            let key = write.record().key();
            match write {
                Write::Create(_) if accounts.contains_key(&key) => {
                    return Err(StoreError::AlreadyExists(key.as_storage_key()));
                }
                Write::Update(_) if !accounts.contains_key(&key) => {
                    return Err(StoreError::Missing(key.as_storage_key()));
                }
                _ => {}
            }
        }

        for write in batch.writes {
            let record = match write {
                Write::Create(r) | Write::Update(r) => r,
            };
            accounts.insert(record.key(), record);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::oracle::{Identity, OracleConfig};
    use crate::store::RecordBody;

    fn config(total_requests: u64) -> RecordBody {
        RecordBody::Config(OracleConfig {
            admin: Identity::from("admin"),
            fee_bps: 500,
            total_requests,
            total_fees_collected: 0,
            initialized_at: 0,
        })
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let store = MemoryStore::new();
        store.apply(WriteBatch::new().create(config(0))).await.unwrap();
        store.apply(WriteBatch::new().update(config(1))).await.unwrap();

        let record = store.read(AccountKey::Config).await.unwrap().unwrap();
        assert_eq!(record.body, config(1));
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = MemoryStore::new();
        store.apply(WriteBatch::new().create(config(0))).await.unwrap();

        // Second create of the same key fails, so the update must not land either.
        let err = store
            .apply(WriteBatch::new().update(config(7)).create(config(8)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let record = store.read(AccountKey::Config).await.unwrap().unwrap();
        assert_eq!(record.body, config(0));
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let store = MemoryStore::new();
        let err = store.apply(WriteBatch::new().update(config(1))).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
        assert_eq!(store.len().await, 0);
    }
}
