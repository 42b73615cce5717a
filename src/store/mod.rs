//! Durable record storage for oracle accounts.
//!
//! Three record kinds live here: the config (one), requests (many) and proofs
//! (zero or one per request). Every `apply` call is all-or-nothing.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::oracle::{DataRequest, OracleConfig, Proof, ProofId, RequestId};

pub const RECORD_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} already exists")]
    AlreadyExists(String),

    #[error("account {0} does not exist")]
    Missing(String),

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),

    #[error("record encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// Account key of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKey {
    Config,
    Request(RequestId),
    Proof(ProofId),
}

impl AccountKey {
    pub fn kind(&self) -> &'static str {
        match self {
            AccountKey::Config => "config",
            AccountKey::Request(_) => "request",
            AccountKey::Proof(_) => "proof",
        }
    }

    /// Stable string form used as the primary key in SQL storage.
    pub fn as_storage_key(&self) -> String {
        match self {
            AccountKey::Config => "oracle".to_string(),
            AccountKey::Request(id) => format!("request:{}", id.0),
            AccountKey::Proof(id) => format!("proof:{}", id.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum RecordBody {
    Config(OracleConfig),
    Request(DataRequest),
    Proof(Proof),
}

/// Versioned envelope around a record body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub version: u16,
    pub body: RecordBody,
}

impl StoredRecord {
    pub fn new(body: RecordBody) -> Self {
        Self {
            version: RECORD_VERSION,
            body,
        }
    }

    pub fn key(&self) -> AccountKey {
        match &self.body {
            RecordBody::Config(_) => AccountKey::Config,
            RecordBody::Request(r) => AccountKey::Request(r.id),
            RecordBody::Proof(p) => AccountKey::Proof(p.id),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let record: StoredRecord = serde_json::from_slice(bytes)?;
        if record.version != RECORD_VERSION {
            return Err(StoreError::UnsupportedVersion(record.version));
        }
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Create(StoredRecord),
    Update(StoredRecord),
}

impl Write {
    pub fn record(&self) -> &StoredRecord {
        match self {
            Write::Create(r) | Write::Update(r) => r,
        }
    }
}

/// Writes applied together by a single `apply` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(mut self, body: RecordBody) -> Self {
        self.writes.push(Write::Create(StoredRecord::new(body)));
        self
    }

    pub fn update(mut self, body: RecordBody) -> Self {
        self.writes.push(Write::Update(StoredRecord::new(body)));
        self
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read(&self, key: AccountKey) -> Result<Option<StoredRecord>, StoreError>;

    /// Every stored record, in no particular order.
    async fn scan(&self) -> Result<Vec<StoredRecord>, StoreError>;

    /// Applies every write or none of them.
    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::oracle::{Identity, RequestStatus};
    use uuid::Uuid;

    #[test]
    fn test_unsettled_request_encodes_explicit_null() {
        let request = DataRequest {
            id: RequestId(Uuid::nil()),
            requester: Identity::from("agentX"),
            data_type: "SOL/USD".to_string(),
            quantity: 1,
            status: RequestStatus::Pending,
            created_at: 10,
            payment_amount: None,
            settled_at: None,
            proof_id: None,
        };
        let record = StoredRecord::new(RecordBody::Request(request));
        let json: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["body"]["kind"], "request");
        assert!(json["body"]["data"]["payment_amount"].is_null());
        assert!(json["body"]["data"]["settled_at"].is_null());
        assert_eq!(StoredRecord::decode(&record.encode().unwrap()).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let raw = br#"{"version":9,"body":{"kind":"config","data":{"admin":"a","fee_bps":1,"total_requests":0,"total_fees_collected":0,"initialized_at":0}}}"#;
        assert!(matches!(
            StoredRecord::decode(raw),
            Err(StoreError::UnsupportedVersion(9))
        ));
    }
}
