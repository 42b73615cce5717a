//! Request ledger - owns the oracle config, every data request and every proof.
//!
//! Each request lives in its own slot behind a `tokio::sync::Mutex`, so
//! transitions on one request are serialized while different requests proceed
//! in parallel. The config sits behind a separate mutex; when both are needed
//! the request slot is always taken first. Storage writes are issued while the
//! locks are held and before any in-memory field changes, so a rejected write
//! leaves nothing behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::{OracleError, Result};
use crate::models::oracle::{
    ActivityEntry, DataRequest, Digest, Identity, Instruction, ListRequestsQuery, OracleConfig,
    OracleStats, Proof, ProofId, RequestId, RequestStatus, SettlementResult, SettlementSplit,
};
use crate::services::activity::{ActivityLog, DEFAULT_ACTIVITY_CAPACITY};
use crate::services::clock::{Clock, SystemClock};
use crate::services::commitment::{ProofCommitment, Sha256Commitment};
use crate::store::{MemoryStore, RecordBody, RecordStore, StoreError, WriteBatch};

pub const MAX_FEE_BPS: u16 = 10_000;
pub const MAX_DATA_TYPE_LEN: usize = 32;

struct RequestSlot {
    request: DataRequest,
    proof: Option<Proof>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Arc<Mutex<RequestSlot>>>,
    index: HashMap<RequestId, usize>,
}

pub struct RequestLedger {
    store: Arc<dyn RecordStore>,
    commitment: Arc<dyn ProofCommitment>,
    clock: Arc<dyn Clock>,
    config: Mutex<Option<OracleConfig>>,
    arena: RwLock<Arena>,
    activity: Mutex<ActivityLog>,
    last_timestamp: AtomicI64,
}

impl RequestLedger {
    /// Create an empty, uninitialized ledger on top of `store`
    pub fn new(
        store: Arc<dyn RecordStore>,
        commitment: Arc<dyn ProofCommitment>,
        clock: Arc<dyn Clock>,
        activity_capacity: usize,
    ) -> Self {
        Self {
            store,
            commitment,
            clock,
            config: Mutex::new(None),
            arena: RwLock::new(Arena::default()),
            activity: Mutex::new(ActivityLog::new(activity_capacity)),
            last_timestamp: AtomicI64::new(i64::MIN),
        }
    }

    /// Fresh ledger with an in-memory store, SHA-256 commitments and wall time
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Sha256Commitment),
            Arc::new(SystemClock),
            DEFAULT_ACTIVITY_CAPACITY,
        )
    }

    /// Rebuild a ledger from everything already in `store`
    pub async fn open(
        store: Arc<dyn RecordStore>,
        commitment: Arc<dyn ProofCommitment>,
        clock: Arc<dyn Clock>,
        activity_capacity: usize,
    ) -> Result<Self> {
        let records = store.scan().await?;
        let ledger = Self::new(store, commitment, clock, activity_capacity);

        let mut config = None;
        let mut requests = Vec::new();
        let mut proofs: HashMap<RequestId, Proof> = HashMap::new();
        for record in records {
            match record.body {
                RecordBody::Config(c) => config = Some(c),
                RecordBody::Request(r) => requests.push(r),
                RecordBody::Proof(p) => {
                    proofs.insert(p.request_id, p);
                }
            }
        }

        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut latest = config.as_ref().map(|c| c.initialized_at).unwrap_or(i64::MIN);
        let mut arena = Arena::default();
        for request in requests {
            let proof = proofs.remove(&request.id);
            if (request.status == RequestStatus::Pending) != proof.is_none() {
                error!(request_id = %request.id.0, status = %request.status, "stored request and proof disagree");
                return Err(StoreError::Missing(format!("proof for {}", request.id)).into());
            }
            latest = latest
                .max(request.created_at)
                .max(request.settled_at.unwrap_or(i64::MIN))
                .max(proof.as_ref().map(|p| p.verified_at).unwrap_or(i64::MIN));
            arena.index.insert(request.id, arena.slots.len());
            arena
                .slots
                .push(Arc::new(Mutex::new(RequestSlot { request, proof })));
        }

        if !proofs.is_empty() {
            warn!(orphans = proofs.len(), "ignoring proofs without a request");
        }

        info!(
            requests = arena.slots.len(),
            initialized = config.is_some(),
            "request ledger restored"
        );

        ledger.last_timestamp.store(latest, Ordering::SeqCst);
        *ledger.config.lock().await = config;
        *ledger.arena.write().await = arena;
        Ok(ledger)
    }

    /// Initialize the oracle config. Only one call ever succeeds.
    pub async fn init(&self, admin: Identity, fee_bps: u16) -> Result<OracleConfig> {
        if fee_bps > MAX_FEE_BPS {
            return Err(OracleError::InvalidFeeRate(fee_bps));
        }

        let mut guard = self.config.lock().await;
        if guard.is_some() {
            return Err(OracleError::AlreadyInitialized);
        }

        let config = OracleConfig {
            admin,
            fee_bps,
            total_requests: 0,
            total_fees_collected: 0,
            initialized_at: self.now(),
        };

        match self
            .store
            .apply(WriteBatch::new().create(RecordBody::Config(config.clone())))
            .await
        {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => return Err(OracleError::AlreadyInitialized),
            Err(e) => {
                error!(error = %e, "failed to persist oracle config");
                return Err(e.into());
            }
        }

        *guard = Some(config.clone());
        drop(guard);

        info!(admin = %config.admin, fee_bps, "oracle initialized");
        self.record(
            Instruction::InitOracle,
            None,
            config.initialized_at,
            format!("admin={} fee_bps={}", config.admin, fee_bps),
        )
        .await;

        Ok(config)
    }

    pub async fn config(&self) -> Result<OracleConfig> {
        self.config
            .lock()
            .await
            .clone()
            .ok_or(OracleError::NotInitialized)
    }

    /// Open a new request in `Pending` and count it in `total_requests`
    pub async fn create_request(
        &self,
        requester: Identity,
        data_type: &str,
        quantity: u64,
    ) -> Result<DataRequest> {
        if quantity == 0 {
            return Err(OracleError::InvalidQuantity);
        }
        if data_type.is_empty() || data_type.len() > MAX_DATA_TYPE_LEN {
            return Err(OracleError::InvalidDataType(data_type.len()));
        }

        let mut guard = self.config.lock().await;
        let config = guard.as_mut().ok_or(OracleError::NotInitialized)?;
        let total_requests = config
            .total_requests
            .checked_add(1)
            .ok_or(OracleError::Overflow("total_requests"))?;

        let request = DataRequest {
            id: RequestId::generate(),
            requester,
            data_type: data_type.to_string(),
            quantity,
            status: RequestStatus::Pending,
            created_at: self.now(),
            payment_amount: None,
            settled_at: None,
            proof_id: None,
        };

        let updated_config = OracleConfig {
            total_requests,
            ..config.clone()
        };

        if let Err(e) = self
            .store
            .apply(
                WriteBatch::new()
                    .create(RecordBody::Request(request.clone()))
                    .update(RecordBody::Config(updated_config.clone())),
            )
            .await
        {
            error!(error = %e, data_type, "failed to persist data request");
            return Err(e.into());
        }

        *config = updated_config;
        {
            let mut arena = self.arena.write().await;
            let idx = arena.slots.len();
            arena.index.insert(request.id, idx);
            arena.slots.push(Arc::new(Mutex::new(RequestSlot {
                request: request.clone(),
                proof: None,
            })));
        }
        drop(guard);

        info!(
            request_id = %request.id.0,
            requester = %request.requester,
            data_type,
            quantity,
            "data request created"
        );
        self.record(
            Instruction::RequestData,
            Some(request.id),
            request.created_at,
            format!("{} x{}", data_type, quantity),
        )
        .await;

        Ok(request)
    }

    /// Attach a proof for `data_value` observed at `observed_at` and move the
    /// request to `Verified`. On any failure the request stays `Pending` and
    /// the call can be retried with fresh data.
    pub async fn fetch_and_verify(
        &self,
        request_id: RequestId,
        data_value: i64,
        observed_at: i64,
    ) -> Result<Proof> {
        self.verify_inner(request_id, data_value, observed_at, None)
            .await
    }

    /// Like [`fetch_and_verify`](Self::fetch_and_verify), but the operator also
    /// supplies the commitment it computed; a mismatch is rejected.
    pub async fn fetch_and_verify_claimed(
        &self,
        request_id: RequestId,
        data_value: i64,
        observed_at: i64,
        claimed: Digest,
    ) -> Result<Proof> {
        self.verify_inner(request_id, data_value, observed_at, Some(claimed))
            .await
    }

    async fn verify_inner(
        &self,
        request_id: RequestId,
        data_value: i64,
        observed_at: i64,
        claimed: Option<Digest>,
    ) -> Result<Proof> {
        let slot = self.slot(request_id).await?;
        let mut slot = slot.lock().await;

        if slot.request.status != RequestStatus::Pending {
            warn!(request_id = %request_id.0, status = %slot.request.status, "fetch_and_verify on non-pending request");
            return Err(OracleError::InvalidState {
                expected: RequestStatus::Pending,
                actual: slot.request.status,
            });
        }

        let data_type = slot.request.data_type.clone();
        let commitment = self.commitment.commit(data_value, &data_type, observed_at)?;
        let candidate = claimed.unwrap_or(commitment);
        if !self
            .commitment
            .verify(&candidate, data_value, &data_type, observed_at)?
        {
            warn!(request_id = %request_id.0, claimed = %candidate, "proof verification failed");
            return Err(OracleError::ProofVerificationFailed);
        }

        let proof = Proof {
            id: ProofId::generate(),
            request_id,
            data_value,
            commitment,
            timestamp: observed_at,
            verified_at: self.now(),
        };
        let request = DataRequest {
            status: RequestStatus::Verified,
            proof_id: Some(proof.id),
            ..slot.request.clone()
        };

        if let Err(e) = self
            .store
            .apply(
                WriteBatch::new()
                    .create(RecordBody::Proof(proof.clone()))
                    .update(RecordBody::Request(request.clone())),
            )
            .await
        {
            error!(request_id = %request_id.0, error = %e, "failed to persist proof");
            return Err(e.into());
        }

        slot.request = request;
        slot.proof = Some(proof.clone());
        drop(slot);

        info!(
            request_id = %request_id.0,
            data_value,
            observed_at,
            commitment = %proof.commitment,
            "data verified"
        );
        self.record(
            Instruction::FetchAndVerify,
            Some(request_id),
            proof.verified_at,
            format!("value={} proof={}", data_value, proof.commitment),
        )
        .await;

        Ok(proof)
    }

    /// Move a `Verified` request to `Settled` and add `amount` to
    /// `total_fees_collected`. Amount and split are validated by the caller.
    pub(crate) async fn record_settlement(
        &self,
        request_id: RequestId,
        amount: u64,
        buyback_bps: u16,
        split: SettlementSplit,
    ) -> Result<SettlementResult> {
        let slot = self.slot(request_id).await?;
        let mut slot = slot.lock().await;

        match slot.request.status {
            RequestStatus::Verified => {}
            RequestStatus::Settled => {
                warn!(request_id = %request_id.0, "settlement replay rejected");
                return Err(OracleError::AlreadySettled);
            }
            actual => {
                warn!(request_id = %request_id.0, status = %actual, "settlement before verification");
                return Err(OracleError::InvalidState {
                    expected: RequestStatus::Verified,
                    actual,
                });
            }
        }

        let mut guard = self.config.lock().await;
        let config = guard.as_mut().ok_or(OracleError::NotInitialized)?;
        let total_fees_collected = config
            .total_fees_collected
            .checked_add(amount)
            .ok_or(OracleError::Overflow("total_fees_collected"))?;

        let settled_at = self.now();
        let request = DataRequest {
            status: RequestStatus::Settled,
            payment_amount: Some(amount),
            settled_at: Some(settled_at),
            ..slot.request.clone()
        };
        let updated_config = OracleConfig {
            total_fees_collected,
            ..config.clone()
        };

        if let Err(e) = self
            .store
            .apply(
                WriteBatch::new()
                    .update(RecordBody::Request(request.clone()))
                    .update(RecordBody::Config(updated_config.clone())),
            )
            .await
        {
            error!(request_id = %request_id.0, error = %e, "failed to persist settlement");
            return Err(e.into());
        }

        *config = updated_config;
        slot.request = request;
        drop(guard);
        drop(slot);

        info!(
            request_id = %request_id.0,
            amount,
            buyback = split.buyback,
            treasury = split.treasury,
            "payment settled"
        );
        self.record(
            Instruction::SettlePayment,
            Some(request_id),
            settled_at,
            format!(
                "amount={} buyback={} treasury={}",
                amount, split.buyback, split.treasury
            ),
        )
        .await;

        Ok(SettlementResult {
            request_id,
            amount,
            buyback_bps,
            buyback: split.buyback,
            treasury: split.treasury,
            settled_at,
        })
    }

    pub async fn get(&self, request_id: RequestId) -> Result<DataRequest> {
        let slot = self.slot(request_id).await?;
        let request = slot.lock().await.request.clone();
        Ok(request)
    }

    pub async fn get_proof(&self, request_id: RequestId) -> Result<Proof> {
        let slot = self.slot(request_id).await?;
        let proof = slot.lock().await.proof.clone();
        proof.ok_or_else(|| OracleError::not_found(format!("proof for {}", request_id)))
    }

    /// Requests matching the query, newest first
    pub async fn list(&self, query: &ListRequestsQuery) -> Vec<DataRequest> {
        let page = query.page.unwrap_or(1).max(1) as usize;
        let limit = query.limit.unwrap_or(20).clamp(1, 100) as usize;

        let mut matching = Vec::new();
        for slot in self.snapshot_slots().await.iter().rev() {
            let request = slot.lock().await.request.clone();
            if query.status.map_or(false, |s| s != request.status) {
                continue;
            }
            if query
                .requester
                .as_deref()
                .map_or(false, |r| r != request.requester.0)
            {
                continue;
            }
            matching.push(request);
        }

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect()
    }

    pub async fn stats(&self) -> Result<OracleStats> {
        let config = self.config().await?;
        let mut stats = OracleStats {
            config,
            pending: 0,
            verified: 0,
            settled: 0,
        };
        for slot in self.snapshot_slots().await {
            match slot.lock().await.request.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Verified => stats.verified += 1,
                RequestStatus::Settled => stats.settled += 1,
            }
        }
        Ok(stats)
    }

    pub async fn activity(&self) -> Vec<ActivityEntry> {
        self.activity.lock().await.entries()
    }

    async fn slot(&self, request_id: RequestId) -> Result<Arc<Mutex<RequestSlot>>> {
        let arena = self.arena.read().await;
        arena
            .index
            .get(&request_id)
            .map(|&idx| arena.slots[idx].clone())
            .ok_or_else(|| OracleError::not_found(request_id))
    }

    async fn snapshot_slots(&self) -> Vec<Arc<Mutex<RequestSlot>>> {
        self.arena.read().await.slots.clone()
    }

    /// Wall time, never earlier than any timestamp this ledger handed out.
    fn now(&self) -> i64 {
        let now = self.clock.now();
        self.last_timestamp.fetch_max(now, Ordering::SeqCst).max(now)
    }

    async fn record(
        &self,
        instruction: Instruction,
        request_id: Option<RequestId>,
        at: i64,
        detail: String,
    ) {
        self.activity.lock().await.push(ActivityEntry {
            instruction,
            request_id,
            at,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;

    fn ledger_at(start: i64) -> (RequestLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let ledger = RequestLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Sha256Commitment),
            clock.clone(),
            16,
        );
        (ledger, clock)
    }

    #[tokio::test]
    async fn test_init_rejects_bad_fee_and_reinit() {
        let (ledger, _) = ledger_at(100);

        assert!(matches!(
            ledger.init(Identity::from("admin"), 10_001).await,
            Err(OracleError::InvalidFeeRate(10_001))
        ));
        assert!(matches!(ledger.config().await, Err(OracleError::NotInitialized)));

        let config = ledger.init(Identity::from("admin"), 10_000).await.unwrap();
        assert_eq!(config.total_requests, 0);
        assert_eq!(config.total_fees_collected, 0);

        assert!(matches!(
            ledger.init(Identity::from("other"), 1).await,
            Err(OracleError::AlreadyInitialized)
        ));
        assert_eq!(ledger.config().await.unwrap().admin, Identity::from("admin"));
    }

    #[tokio::test]
    async fn test_create_requires_init() {
        let (ledger, _) = ledger_at(100);
        assert!(matches!(
            ledger.create_request(Identity::from("a"), "SOL/USD", 1).await,
            Err(OracleError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let (ledger, _) = ledger_at(100);
        ledger.init(Identity::from("admin"), 500).await.unwrap();

        assert!(matches!(
            ledger.create_request(Identity::from("a"), "SOL/USD", 0).await,
            Err(OracleError::InvalidQuantity)
        ));
        assert!(matches!(
            ledger.create_request(Identity::from("a"), "", 1).await,
            Err(OracleError::InvalidDataType(0))
        ));
        let long = "X".repeat(33);
        assert!(matches!(
            ledger.create_request(Identity::from("a"), &long, 1).await,
            Err(OracleError::InvalidDataType(33))
        ));
        assert_eq!(ledger.config().await.unwrap().total_requests, 0);
    }

    #[tokio::test]
    async fn test_verify_moves_to_verified_once() {
        let (ledger, _) = ledger_at(100);
        ledger.init(Identity::from("admin"), 500).await.unwrap();
        let request = ledger
            .create_request(Identity::from("agentX"), "SOL/USD", 1)
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let proof = ledger.fetch_and_verify(request.id, 19550, 90).await.unwrap();
        assert_eq!(
            proof.commitment,
            Sha256Commitment.commit(19550, "SOL/USD", 90).unwrap()
        );

        let stored = ledger.get(request.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Verified);
        assert_eq!(stored.proof_id, Some(proof.id));
        assert_eq!(ledger.get_proof(request.id).await.unwrap(), proof);

        assert!(matches!(
            ledger.fetch_and_verify(request.id, 1, 91).await,
            Err(OracleError::InvalidState {
                expected: RequestStatus::Pending,
                actual: RequestStatus::Verified
            })
        ));
        assert_eq!(ledger.get_proof(request.id).await.unwrap(), proof);
    }

    #[tokio::test]
    async fn test_claimed_commitment_mismatch_keeps_pending() {
        let (ledger, _) = ledger_at(100);
        ledger.init(Identity::from("admin"), 500).await.unwrap();
        let request = ledger
            .create_request(Identity::from("agentX"), "SOL/USD", 1)
            .await
            .unwrap();

        let wrong = Sha256Commitment.commit(19551, "SOL/USD", 90).unwrap();
        assert!(matches!(
            ledger
                .fetch_and_verify_claimed(request.id, 19550, 90, wrong)
                .await,
            Err(OracleError::ProofVerificationFailed)
        ));
        assert_eq!(
            ledger.get(request.id).await.unwrap().status,
            RequestStatus::Pending
        );
        assert!(matches!(
            ledger.get_proof(request.id).await,
            Err(OracleError::NotFound(_))
        ));

        // Retry with the right commitment succeeds.
        let right = Sha256Commitment.commit(19550, "SOL/USD", 90).unwrap();
        ledger
            .fetch_and_verify_claimed(request.id, 19550, 90, right)
            .await
            .unwrap();
        assert_eq!(
            ledger.get(request.id).await.unwrap().status,
            RequestStatus::Verified
        );
    }

    #[tokio::test]
    async fn test_unknown_request_not_found() {
        let (ledger, _) = ledger_at(100);
        ledger.init(Identity::from("admin"), 500).await.unwrap();
        let id = RequestId::generate();
        assert!(matches!(ledger.get(id).await, Err(OracleError::NotFound(_))));
        assert!(matches!(
            ledger.fetch_and_verify(id, 1, 1).await,
            Err(OracleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timestamps_never_go_backwards() {
        let (ledger, clock) = ledger_at(1_000);
        ledger.init(Identity::from("admin"), 500).await.unwrap();
        let first = ledger
            .create_request(Identity::from("a"), "SOL/USD", 1)
            .await
            .unwrap();

        clock.set(10);
        let second = ledger
            .create_request(Identity::from("a"), "SOL/USD", 1)
            .await
            .unwrap();
        assert!(second.created_at >= first.created_at);
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let (ledger, clock) = ledger_at(100);
        ledger.init(Identity::from("admin"), 500).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            clock.advance(1);
            let requester = if i % 2 == 0 { "even" } else { "odd" };
            let r = ledger
                .create_request(Identity::from(requester), "SOL/USD", 1)
                .await
                .unwrap();
            ids.push(r.id);
        }
        ledger.fetch_and_verify(ids[4], 1, 1).await.unwrap();

        let all = ledger.list(&ListRequestsQuery::default()).await;
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, ids[4]);

        let even = ledger
            .list(&ListRequestsQuery {
                requester: Some("even".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(even.len(), 3);

        let verified = ledger
            .list(&ListRequestsQuery {
                status: Some(RequestStatus::Verified),
                ..Default::default()
            })
            .await;
        assert_eq!(verified.len(), 1);

        let page2 = ledger
            .list(&ListRequestsQuery {
                page: Some(2),
                limit: Some(2),
                ..Default::default()
            })
            .await;
        assert_eq!(page2.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
    }

    #[tokio::test]
    async fn test_activity_records_instructions() {
        let (ledger, _) = ledger_at(100);
        ledger.init(Identity::from("admin"), 500).await.unwrap();
        let r = ledger
            .create_request(Identity::from("a"), "SOL/USD", 2)
            .await
            .unwrap();
        ledger.fetch_and_verify(r.id, 5, 5).await.unwrap();

        let log: Vec<Instruction> = ledger
            .activity()
            .await
            .into_iter()
            .map(|e| e.instruction)
            .collect();
        assert_eq!(
            log,
            vec![
                Instruction::InitOracle,
                Instruction::RequestData,
                Instruction::FetchAndVerify
            ]
        );
    }
}
