//! Business logic services for the XyData oracle

pub mod activity;
pub mod clock;
pub mod commitment;
pub mod ledger;
pub mod oracle_service;
pub mod price_feed;
pub mod settlement;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commitment::{ProofCommitment, Sha256Commitment};
pub use ledger::RequestLedger;
pub use oracle_service::OracleService;
pub use price_feed::{CoinGeckoSource, DataSource, StaticSource};
pub use settlement::{compute_split, SettlementEngine, DEFAULT_BUYBACK_BPS};
