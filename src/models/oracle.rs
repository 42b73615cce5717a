use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;
use validator::Validate;

/// Identity of an admin, requester or operator (e.g. a base58 public key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity(value.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn generate() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofId(pub Uuid);

impl ProofId {
    pub fn generate() -> Self {
        ProofId(Uuid::new_v4())
    }
}

impl fmt::Display for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proof {}", self.0)
    }
}

/// 32-byte commitment digest, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "digest must be 32 bytes".to_string())?;
        Ok(Digest(arr))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a data request. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Verified,
    Settled,
}

impl RequestStatus {
    /// Position in the lifecycle, used to check forward-only movement.
    pub fn rank(self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Verified => 1,
            RequestStatus::Settled => 2,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Verified => "verified",
            RequestStatus::Settled => "settled",
        };
        f.write_str(s)
    }
}

/// Global oracle configuration and cumulative counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    pub admin: Identity,
    pub fee_bps: u16,
    pub total_requests: u64,
    pub total_fees_collected: u64,
    pub initialized_at: i64,
}

/// A single data request and its payment fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    pub id: RequestId,
    pub requester: Identity,
    pub data_type: String,
    pub quantity: u64,
    pub status: RequestStatus,
    pub created_at: i64,
    /// `None` until settled; a settlement of zero is never recorded.
    pub payment_amount: Option<u64>,
    pub settled_at: Option<i64>,
    pub proof_id: Option<ProofId>,
}

/// Verification proof attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub id: ProofId,
    pub request_id: RequestId,
    /// Integer-scaled value (e.g. cents for a USD price)
    pub data_value: i64,
    pub commitment: Digest,
    pub timestamp: i64,
    pub verified_at: i64,
}

/// Buyback/treasury split of a settled payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSplit {
    pub buyback: u64,
    pub treasury: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub request_id: RequestId,
    pub amount: u64,
    pub buyback_bps: u16,
    pub buyback: u64,
    pub treasury: u64,
    pub settled_at: i64,
}

/// A value observed by the data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub value: i64,
    pub observed_at: i64,
}

/// Instructions recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    InitOracle,
    RequestData,
    FetchAndVerify,
    SettlePayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub instruction: Instruction,
    pub request_id: Option<RequestId>,
    pub at: i64,
    pub detail: String,
}

/// Oracle snapshot for dashboards
#[derive(Debug, Clone, Serialize)]
pub struct OracleStats {
    pub config: OracleConfig,
    pub pending: u64,
    pub verified: u64,
    pub settled: u64,
}

/// Request DTO for initializing the oracle
#[derive(Debug, Deserialize, Validate)]
pub struct InitOracleRequest {
    #[validate(length(min = 1, max = 128))]
    pub admin: String,
    pub fee_bps: u16,
}

/// Request DTO for creating a data request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDataRequest {
    #[validate(length(min = 1, max = 128))]
    pub requester: String,
    pub data_type: String,
    pub quantity: u64,
}

/// Request DTO for attaching a verified value
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub data_value: i64,
    pub timestamp: i64,
    /// Operator-computed commitment, checked against the recomputed one
    pub commitment: Option<Digest>,
}

/// Request DTO for settling a verified request
#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub amount: u64,
    pub buyback_bps: Option<u16>,
}

/// Query parameters for listing requests
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub requester: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}
