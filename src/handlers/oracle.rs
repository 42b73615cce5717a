use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::ApiResult;
use crate::app_state::AppState;
use crate::models::oracle::{
    ActivityEntry, CreateDataRequest, DataRequest, Identity, InitOracleRequest,
    ListRequestsQuery, OracleConfig, OracleStats, Proof, RequestId, SettleRequest,
    SettlementResult, VerifyRequest,
};
use crate::models::ApiResponse;

/// Initialize the oracle config
pub async fn init_oracle(
    State(state): State<AppState>,
    Json(payload): Json<InitOracleRequest>,
) -> ApiResult<OracleConfig> {
    payload.validate()?;
    let config = state
        .oracle_service
        .init_oracle(Identity(payload.admin), payload.fee_bps)
        .await?;
    Ok(Json(ApiResponse::ok(config)))
}

/// Oracle config and request counts
pub async fn get_oracle(State(state): State<AppState>) -> ApiResult<OracleStats> {
    Ok(Json(ApiResponse::ok(state.oracle_service.stats().await?)))
}

/// Create a new data request
pub async fn request_data(
    State(state): State<AppState>,
    Json(payload): Json<CreateDataRequest>,
) -> ApiResult<DataRequest> {
    payload.validate()?;
    let request = state
        .oracle_service
        .request_data(Identity(payload.requester), &payload.data_type, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Vec<DataRequest>> {
    Ok(Json(ApiResponse::ok(
        state.oracle_service.list_requests(&query).await,
    )))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DataRequest> {
    let request = state.oracle_service.get_request(RequestId(id)).await?;
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn get_proof(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Proof> {
    let proof = state.oracle_service.get_proof(RequestId(id)).await?;
    Ok(Json(ApiResponse::ok(proof)))
}

/// Attach an operator-supplied value to a pending request
pub async fn verify_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyRequest>,
) -> ApiResult<Proof> {
    let proof = state
        .oracle_service
        .fetch_and_verify(
            RequestId(id),
            payload.data_value,
            payload.timestamp,
            payload.commitment,
        )
        .await?;
    Ok(Json(ApiResponse::ok(proof)))
}

/// Fetch a quote from the configured data source and verify it
pub async fn fulfill_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Proof> {
    let proof = state.oracle_service.fulfill(RequestId(id)).await?;
    Ok(Json(ApiResponse::ok(proof)))
}

pub async fn settle_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SettleRequest>,
) -> ApiResult<SettlementResult> {
    let result = state
        .oracle_service
        .settle_payment(RequestId(id), payload.amount, payload.buyback_bps)
        .await?;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn get_activity(State(state): State<AppState>) -> ApiResult<Vec<ActivityEntry>> {
    Ok(Json(ApiResponse::ok(state.oracle_service.activity().await)))
}
