// =============================================================================
// Tech Volatility Dashboard: Main Entry Point
// =============================================================================
//
// Fetches daily prices for the configured ticker universe, then serves
// rolling volatility, moving averages, 1-year return and the cross-ticker
// correlation heatmap over HTTP.  Price tables are cached per
// (tickers, period) and refetched once the cache TTL expires.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analytics;
mod api;
mod app_state;
mod error;
mod market_data;
mod runtime_config;
mod types;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::YahooChartClient;
use crate::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Tech Volatility Dashboard starting up");

    let config_path =
        std::env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = RuntimeConfig::load_or_init(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults for this run");
        RuntimeConfig::default()
    });

    if let Err(e) = config.apply_env_overrides(|key| std::env::var(key).ok()) {
        warn!(error = %e, "Ignoring invalid environment override");
    }

    info!(
        tickers = ?config.tickers,
        period = %config.period,
        overlap_policy = %config.overlap_policy,
        cache_ttl_secs = config.cache_ttl_secs,
        "Configured universe"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let provider = Arc::new(YahooChartClient::new(config.provider_base_url.clone()));
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, provider));

    // ── 3. Warm the price cache ──────────────────────────────────────────
    match state.load_universe().await {
        Ok(table) => info!(tickers = table.len(), "Initial price table loaded"),
        Err(e) => error!(error = %e, "Initial price fetch failed, will retry on first request"),
    }

    // ── 4. Serve the API ─────────────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Tech Volatility Dashboard shut down complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Shutdown signal received, stopping gracefully");
}
