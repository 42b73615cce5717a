//! XyData Oracle Server
//!
//! Serves the oracle command surface over HTTP: init, request, verify,
//! fulfill from the price source, and settle.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xydata_oracle::app_state::AppState;
use xydata_oracle::config::AppConfig;
use xydata_oracle::models::oracle::Identity;
use xydata_oracle::services::{
    CoinGeckoSource, OracleService, RequestLedger, Sha256Commitment, SystemClock,
};
use xydata_oracle::store::{MemoryStore, PgStore, RecordStore};
use xydata_oracle::{routes, OracleError};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("xydata_oracle=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgStore::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?,
        ),
        None => {
            warn!("DATABASE_URL not set; oracle state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let ledger = Arc::new(
        RequestLedger::open(
            store,
            Arc::new(Sha256Commitment),
            Arc::new(SystemClock),
            config.activity_log_capacity,
        )
        .await
        .context("failed to restore request ledger")?,
    );

    if let Some(bootstrap) = &config.bootstrap {
        match ledger
            .init(Identity(bootstrap.admin.clone()), bootstrap.fee_bps)
            .await
        {
            Ok(_) | Err(OracleError::AlreadyInitialized) => {}
            Err(e) => return Err(e).context("failed to initialize oracle"),
        }
    }

    let source = CoinGeckoSource::new(
        config.price_source_url.clone(),
        config.price_scale,
        config.price_source_timeout,
    )
    .context("failed to build price source client")?;

    let oracle_service = Arc::new(OracleService::new(
        ledger,
        Arc::new(source),
        config.buyback_bps,
    ));

    let app = routes::app(AppState::new(oracle_service)).layer(build_cors_layer(&config));

    info!("Server starting on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let allowed_origins = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
