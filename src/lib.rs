//! XyData Oracle
//!
//! Request lifecycle engine for a data oracle: requests are created, verified
//! against a commitment over fetched data, and settled with a buyback/treasury
//! split of the payment.

pub mod app_state;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use error::{OracleError, Result};
