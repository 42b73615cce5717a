//! API handlers for the XyData oracle

pub mod oracle;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::OracleError;
use crate::models::ApiResponse;

pub use oracle::*;

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Oracle(OracleError),
}

impl From<OracleError> for ApiError {
    fn from(err: OracleError) -> Self {
        ApiError::Oracle(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(format!("Validation error: {}", err))
    }
}

pub fn status_for(err: &OracleError) -> StatusCode {
    match err {
        OracleError::InvalidFeeRate(_)
        | OracleError::InvalidQuantity
        | OracleError::InvalidDataType(_)
        | OracleError::ZeroAmount
        | OracleError::InvalidSplit(_)
        | OracleError::EncodingError(_)
        | OracleError::UnknownSymbol(_) => StatusCode::BAD_REQUEST,
        OracleError::NotFound(_) => StatusCode::NOT_FOUND,
        OracleError::AlreadyInitialized
        | OracleError::NotInitialized
        | OracleError::InvalidState { .. }
        | OracleError::AlreadySettled
        | OracleError::Overflow(_) => StatusCode::CONFLICT,
        OracleError::ProofVerificationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        OracleError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
        OracleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Oracle(err) => {
                let code = status_for(&err);
                if code.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (code, err.to_string())
            }
        };
        (code, Json(ApiResponse::<()>::err(message))).into_response()
    }
}
