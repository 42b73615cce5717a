//! Payment settlement with a buyback/treasury split.

use std::sync::Arc;

use crate::error::{OracleError, Result};
use crate::models::oracle::{RequestId, SettlementResult, SettlementSplit};
use crate::services::ledger::RequestLedger;

pub const BPS_DENOMINATOR: u64 = 10_000;
pub const DEFAULT_BUYBACK_BPS: u16 = 8_000;

/// Split `amount` into buyback and treasury shares.
///
/// `buyback` is floored and `treasury` takes the remainder, so the two always
/// sum to `amount` exactly.
pub fn compute_split(amount: u64, buyback_bps: u16) -> Result<SettlementSplit> {
    if u64::from(buyback_bps) > BPS_DENOMINATOR {
        return Err(OracleError::InvalidSplit(buyback_bps));
    }
    let buyback =
        (u128::from(amount) * u128::from(buyback_bps) / u128::from(BPS_DENOMINATOR)) as u64;
    Ok(SettlementSplit {
        buyback,
        treasury: amount - buyback,
    })
}

pub struct SettlementEngine {
    ledger: Arc<RequestLedger>,
    default_buyback_bps: u16,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<RequestLedger>, default_buyback_bps: u16) -> Self {
        Self {
            ledger,
            default_buyback_bps,
        }
    }

    pub fn default_buyback_bps(&self) -> u16 {
        self.default_buyback_bps
    }

    /// Settle a `Verified` request for `amount`. `buyback_bps` falls back to
    /// the engine default (8000 unless configured otherwise).
    pub async fn settle(
        &self,
        request_id: RequestId,
        amount: u64,
        buyback_bps: Option<u16>,
    ) -> Result<SettlementResult> {
        if amount == 0 {
            return Err(OracleError::ZeroAmount);
        }
        let buyback_bps = buyback_bps.unwrap_or(self.default_buyback_bps);
        let split = compute_split(amount, buyback_bps)?;

        self.ledger
            .record_settlement(request_id, amount, buyback_bps, split)
            .await
    }
}
