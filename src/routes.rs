//! Route definitions for the oracle API

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::handlers::*;

// Oracle config routes
pub fn oracle_routes() -> Router<AppState> {
    Router::new()
        .route("/api/oracle", get(get_oracle))
        .route("/api/oracle/init", post(init_oracle))
        .route("/api/activity", get(get_activity))
}

// Data request lifecycle routes
pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/api/requests", post(request_data).get(list_requests))
        .route("/api/requests/:id", get(get_request))
        .route("/api/requests/:id/proof", get(get_proof))
        .route("/api/requests/:id/verify", post(verify_request))
        .route("/api/requests/:id/fulfill", post(fulfill_request))
        .route("/api/requests/:id/settle", post(settle_request))
}

/// Full API router with request tracing, ready to serve
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(oracle_routes())
        .merge(request_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "XyData Oracle API Server"
}

async fn health_check() -> &'static str {
    "OK"
}
