//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::services::OracleService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub oracle_service: Arc<OracleService>,
}

impl AppState {
    pub fn new(oracle_service: Arc<OracleService>) -> Self {
        Self { oracle_service }
    }
}

impl FromRef<AppState> for Arc<OracleService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.oracle_service.clone()
    }
}
