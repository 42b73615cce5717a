//! Operator-facing oracle workflow on top of the ledger, settlement engine and
//! data source.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{OracleError, Result};
use crate::models::oracle::{
    ActivityEntry, DataRequest, Digest, Identity, ListRequestsQuery, OracleConfig, OracleStats,
    Proof, RequestId, RequestStatus, SettlementResult,
};
use crate::services::ledger::RequestLedger;
use crate::services::price_feed::DataSource;
use crate::services::settlement::SettlementEngine;

pub struct OracleService {
    ledger: Arc<RequestLedger>,
    settlement: SettlementEngine,
    source: Arc<dyn DataSource>,
}

impl OracleService {
    pub fn new(ledger: Arc<RequestLedger>, source: Arc<dyn DataSource>, buyback_bps: u16) -> Self {
        Self {
            settlement: SettlementEngine::new(ledger.clone(), buyback_bps),
            ledger,
            source,
        }
    }

    pub fn ledger(&self) -> &Arc<RequestLedger> {
        &self.ledger
    }

    pub async fn init_oracle(&self, admin: Identity, fee_bps: u16) -> Result<OracleConfig> {
        self.ledger.init(admin, fee_bps).await
    }

    pub async fn request_data(
        &self,
        requester: Identity,
        data_type: &str,
        quantity: u64,
    ) -> Result<DataRequest> {
        self.ledger.create_request(requester, data_type, quantity).await
    }

    /// Attach an operator-supplied value, optionally checking its commitment
    pub async fn fetch_and_verify(
        &self,
        request_id: RequestId,
        data_value: i64,
        observed_at: i64,
        claimed: Option<Digest>,
    ) -> Result<Proof> {
        match claimed {
            Some(claimed) => {
                self.ledger
                    .fetch_and_verify_claimed(request_id, data_value, observed_at, claimed)
                    .await
            }
            None => {
                self.ledger
                    .fetch_and_verify(request_id, data_value, observed_at)
                    .await
            }
        }
    }

    /// Fetch a fresh quote for the request and verify it.
    ///
    /// The ledger is not locked while the data source is awaited; a source
    /// failure leaves the request `Pending` and the call can simply be repeated.
    pub async fn fulfill(&self, request_id: RequestId) -> Result<Proof> {
        let request = self.ledger.get(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(OracleError::InvalidState {
                expected: RequestStatus::Pending,
                actual: request.status,
            });
        }

        let quote = match self.source.fetch_quote(&request.data_type).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(request_id = %request_id.0, data_type = %request.data_type, error = %e, "quote fetch failed; request stays pending");
                return Err(e);
            }
        };
        info!(request_id = %request_id.0, value = quote.value, observed_at = quote.observed_at, "quote fetched");

        self.ledger
            .fetch_and_verify(request_id, quote.value, quote.observed_at)
            .await
    }

    pub async fn settle_payment(
        &self,
        request_id: RequestId,
        amount: u64,
        buyback_bps: Option<u16>,
    ) -> Result<SettlementResult> {
        self.settlement.settle(request_id, amount, buyback_bps).await
    }

    pub async fn get_request(&self, request_id: RequestId) -> Result<DataRequest> {
        self.ledger.get(request_id).await
    }

    pub async fn get_proof(&self, request_id: RequestId) -> Result<Proof> {
        self.ledger.get_proof(request_id).await
    }

    pub async fn list_requests(&self, query: &ListRequestsQuery) -> Vec<DataRequest> {
        self.ledger.list(query).await
    }

    pub async fn stats(&self) -> Result<OracleStats> {
        self.ledger.stats().await
    }

    pub async fn activity(&self) -> Vec<ActivityEntry> {
        self.ledger.activity().await
    }
}
