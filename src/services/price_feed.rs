//! Off-chain data sources that produce integer-scaled quotes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{OracleError, Result};
use crate::models::oracle::Quote;

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Latest value for `data_type` and the time it was observed.
    async fn fetch_quote(&self, data_type: &str) -> Result<Quote>;
}

/// CoinGecko `/simple/price` client for `BASE/QUOTE` pairs
pub struct CoinGeckoSource {
    base_url: String,
    scale: u32,
    http: Client,
}

impl CoinGeckoSource {
    pub fn new(base_url: impl Into<String>, scale: u32, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::SourceUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scale,
            http,
        })
    }
}

#[async_trait]
impl DataSource for CoinGeckoSource {
    async fn fetch_quote(&self, data_type: &str) -> Result<Quote> {
        let (coin_id, vs_currency) = coingecko_pair(data_type)?;

        info!(data_type, coin_id, "fetching quote from CoinGecko");
        let body = self
            .http
            .get(format!("{}/simple/price", self.base_url))
            .query(&[
                ("ids", coin_id),
                ("vs_currencies", vs_currency.as_str()),
                ("include_last_updated_at", "true"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(data_type, error = %e, "CoinGecko request failed");
                OracleError::SourceUnavailable(e.to_string())
            })?
            .json::<Value>()
            .await
            .map_err(|e| OracleError::SourceUnavailable(format!("invalid response body: {e}")))?;

        parse_simple_price(&body, coin_id, &vs_currency, self.scale, Utc::now().timestamp())
    }
}

/// Map `SOL/USD` to CoinGecko's `("solana", "usd")`.
pub fn coingecko_pair(data_type: &str) -> Result<(&'static str, String)> {
    let (base, quote) = data_type
        .split_once('/')
        .ok_or_else(|| OracleError::UnknownSymbol(data_type.to_string()))?;

    let coin_id = match base.to_ascii_uppercase().as_str() {
        "SOL" => "solana",
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "USDC" => "usd-coin",
        "USDT" => "tether",
        "BONK" => "bonk",
        "JUP" => "jupiter-exchange-solana",
        _ => return Err(OracleError::UnknownSymbol(data_type.to_string())),
    };

    if quote.is_empty() || !quote.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(OracleError::UnknownSymbol(data_type.to_string()));
    }

    Ok((coin_id, quote.to_ascii_lowercase()))
}

/// Pull `body[coin_id][vs_currency]` out of a `/simple/price` response and
/// scale it by `10^scale`.
pub fn parse_simple_price(
    body: &Value,
    coin_id: &str,
    vs_currency: &str,
    scale: u32,
    fallback_observed_at: i64,
) -> Result<Quote> {
    let entry = body
        .get(coin_id)
        .ok_or_else(|| OracleError::SourceUnavailable(format!("no price for {coin_id}")))?;
    let price = entry
        .get(vs_currency)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            OracleError::SourceUnavailable(format!("no {vs_currency} price for {coin_id}"))
        })?;
    let observed_at = entry
        .get("last_updated_at")
        .and_then(Value::as_i64)
        .unwrap_or(fallback_observed_at);

    Ok(Quote {
        value: scale_price(price, scale)?,
        observed_at,
    })
}

/// Convert a decimal price to an integer with `scale` decimal places kept.
pub fn scale_price(price: f64, scale: u32) -> Result<i64> {
    let factor = 10f64.powi(scale as i32);
    let scaled = (price * factor).round();
    if !scaled.is_finite() || scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
        return Err(OracleError::SourceUnavailable(format!(
            "price {price} does not fit at scale {scale}"
        )));
    }
    Ok(scaled as i64)
}

/// Fixed quotes held in memory, for tests and local simulation
#[derive(Default)]
pub struct StaticSource {
    quotes: RwLock<HashMap<String, Quote>>,
    unavailable: RwLock<bool>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_quote(&self, data_type: &str, quote: Quote) {
        self.quotes
            .write()
            .await
            .insert(data_type.to_string(), quote);
    }

    /// Make every fetch fail with `SourceUnavailable` until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }
}

#[async_trait]
impl DataSource for StaticSource {
    async fn fetch_quote(&self, data_type: &str) -> Result<Quote> {
        if *self.unavailable.read().await {
            return Err(OracleError::SourceUnavailable("static source offline".into()));
        }
        self.quotes
            .read()
            .await
            .get(data_type)
            .copied()
            .ok_or_else(|| OracleError::UnknownSymbol(data_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pair_mapping() {
        let (id, vs) = coingecko_pair("SOL/USD").unwrap();
        assert_eq!((id, vs.as_str()), ("solana", "usd"));
        let (id, vs) = coingecko_pair("btc/eur").unwrap();
        assert_eq!((id, vs.as_str()), ("bitcoin", "eur"));

        assert!(matches!(coingecko_pair("DOGE/USD"), Err(OracleError::UnknownSymbol(_))));
        assert!(matches!(coingecko_pair("SOLUSD"), Err(OracleError::UnknownSymbol(_))));
        assert!(matches!(coingecko_pair("SOL/"), Err(OracleError::UnknownSymbol(_))));
    }

    #[test]
    fn test_parse_simple_price_scales_to_cents() {
        let body = json!({"solana": {"usd": 195.5, "last_updated_at": 1_700_000_000}});
        let quote = parse_simple_price(&body, "solana", "usd", 2, 0).unwrap();
        assert_eq!(quote, Quote { value: 19550, observed_at: 1_700_000_000 });
    }

    #[test]
    fn test_parse_simple_price_falls_back_to_now() {
        let body = json!({"bitcoin": {"usd": 64000.129}});
        let quote = parse_simple_price(&body, "bitcoin", "usd", 2, 42).unwrap();
        assert_eq!(quote, Quote { value: 6_400_013, observed_at: 42 });
    }

    #[test]
    fn test_parse_simple_price_missing_fields() {
        let body = json!({"solana": {}});
        assert!(matches!(
            parse_simple_price(&body, "solana", "usd", 2, 0),
            Err(OracleError::SourceUnavailable(_))
        ));
        assert!(matches!(
            parse_simple_price(&json!({}), "solana", "usd", 2, 0),
            Err(OracleError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_scale_price_overflow() {
        assert!(scale_price(1e30, 2).is_err());
        assert!(scale_price(f64::NAN, 2).is_err());
        assert_eq!(scale_price(1.0, 2).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new();
        source
            .set_quote("SOL/USD", Quote { value: 19550, observed_at: 5 })
            .await;
        assert_eq!(source.fetch_quote("SOL/USD").await.unwrap().value, 19550);
        assert!(matches!(
            source.fetch_quote("BTC/USD").await,
            Err(OracleError::UnknownSymbol(_))
        ));

        source.set_unavailable(true).await;
        assert!(matches!(
            source.fetch_quote("SOL/USD").await,
            Err(OracleError::SourceUnavailable(_))
        ));
    }
}
