//! Error kinds returned by the oracle core

use thiserror::Error;

use crate::models::oracle::RequestStatus;
use crate::store::StoreError;

/// Every failure a core operation can report.
///
/// A failed operation never leaves partial state behind, so all of these are
/// recoverable by the caller.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("fee rate {0} bps exceeds 10000")]
    InvalidFeeRate(u16),

    #[error("oracle is already initialized")]
    AlreadyInitialized,

    #[error("oracle has not been initialized")]
    NotInitialized,

    #[error("quantity must be greater than zero")]
    InvalidQuantity,

    #[error("data type must be 1..=32 bytes, got {0}")]
    InvalidDataType(usize),

    #[error("{0} not found")]
    NotFound(String),

    #[error("request is {actual}, expected {expected}")]
    InvalidState {
        expected: RequestStatus,
        actual: RequestStatus,
    },

    #[error("request is already settled")]
    AlreadySettled,

    #[error("settlement amount must be greater than zero")]
    ZeroAmount,

    #[error("buyback share {0} bps exceeds 10000")]
    InvalidSplit(u16),

    #[error("commitment encoding failed: {0}")]
    EncodingError(String),

    #[error("proof verification failed")]
    ProofVerificationFailed,

    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("{0} counter overflow")]
    Overflow(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl OracleError {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        OracleError::NotFound(what.to_string())
    }
}

pub type Result<T, E = OracleError> = std::result::Result<T, E>;
