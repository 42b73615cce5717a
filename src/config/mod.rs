//! Runtime configuration loaded from the environment

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::services::activity::DEFAULT_ACTIVITY_CAPACITY;
use crate::services::price_feed::DEFAULT_COINGECKO_URL;
use crate::services::settlement::DEFAULT_BUYBACK_BPS;

/// Admin and fee applied through `init` at startup when the oracle is new
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub admin: String,
    pub fee_bps: u16,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub cors_allowed_origins: Vec<String>,
    pub database_url: Option<String>,
    pub bootstrap: Option<BootstrapConfig>,
    pub buyback_bps: u16,
    pub price_source_url: String,
    pub price_source_timeout: Duration,
    pub price_scale: u32,
    pub activity_log_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host: IpAddr = parse_or(&lookup, "BIND_ADDR", IpAddr::from([127, 0, 0, 1]))?;
        let port: u16 = parse_or(&lookup, "PORT", 3001)?;

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let bootstrap = match (lookup("ORACLE_ADMIN"), lookup("ORACLE_FEE_BPS")) {
            (Some(admin), fee) if !admin.trim().is_empty() => Some(BootstrapConfig {
                admin: admin.trim().to_string(),
                fee_bps: match fee {
                    Some(raw) => raw
                        .trim()
                        .parse()
                        .with_context(|| format!("ORACLE_FEE_BPS must be a number, got {raw:?}"))?,
                    None => 0,
                },
            }),
            _ => None,
        };

        let buyback_bps: u16 = parse_or(&lookup, "BUYBACK_BPS", DEFAULT_BUYBACK_BPS)?;
        if buyback_bps > 10_000 {
            bail!("BUYBACK_BPS must be at most 10000, got {buyback_bps}");
        }

        let timeout_secs: u64 = parse_or(&lookup, "PRICE_SOURCE_TIMEOUT_SECONDS", 10)?;
        let price_scale: u32 = parse_or(&lookup, "PRICE_SCALE", 2)?;
        if price_scale > 12 {
            bail!("PRICE_SCALE must be at most 12, got {price_scale}");
        }

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            cors_allowed_origins,
            database_url,
            bootstrap,
            buyback_bps,
            price_source_url: lookup("PRICE_SOURCE_URL")
                .unwrap_or_else(|| DEFAULT_COINGECKO_URL.to_string()),
            price_source_timeout: Duration::from_secs(timeout_secs),
            price_scale,
            activity_log_capacity: parse_or(
                &lookup,
                "ACTIVITY_LOG_CAPACITY",
                DEFAULT_ACTIVITY_CAPACITY,
            )?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3001".parse().unwrap());
        assert_eq!(config.buyback_bps, 8_000);
        assert_eq!(config.price_scale, 2);
        assert!(config.database_url.is_none());
        assert!(config.bootstrap.is_none());
        assert_eq!(config.cors_allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_bootstrap_and_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("ORACLE_ADMIN", "admin_key"),
            ("ORACLE_FEE_BPS", "500"),
            ("BUYBACK_BPS", "7000"),
            ("CORS_ALLOWED_ORIGINS", "http://a, http://b"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(
            config.bootstrap,
            Some(BootstrapConfig {
                admin: "admin_key".to_string(),
                fee_bps: 500
            })
        );
        assert_eq!(config.buyback_bps, 7_000);
        assert_eq!(config.cors_allowed_origins, vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_from(&[("PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("BUYBACK_BPS", "10001")]).is_err());
        assert!(config_from(&[("ORACLE_ADMIN", "a"), ("ORACLE_FEE_BPS", "x")]).is_err());
    }
}
