// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the configuration, the acquisition provider and the price cache
// together for the HTTP handlers.  Engines never see this struct: handlers
// pull an `Arc<PriceTable>` snapshot out of it and hand that to the pure
// analytics functions.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the config and the error ring.
//   - No lock is held across the provider `.await`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

use crate::market_data::{CacheStats, PriceCache, PriceProvider, PriceTable};
use crate::runtime_config::RuntimeConfig;
use crate::types::LookbackPeriod;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Machine-readable kind (e.g. `provider`, `insufficient_overlap`).
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Health/status payload.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state_version: u64,
    pub uptime_secs: u64,
    pub server_time: i64,
    pub tickers: Vec<String>,
    pub period: LookbackPeriod,
    pub cache: CacheStats,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

pub struct AppState {
    /// Incremented on every refetch, refresh and recorded error.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub provider: Arc<dyn PriceProvider>,
    pub price_cache: PriceCache,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, provider: Arc<dyn PriceProvider>) -> Self {
        let price_cache = PriceCache::new(config.cache_ttl(), config.cache_max_entries);

        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            provider,
            price_cache,
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Data Acquisition ────────────────────────────────────────────────

    /// Price table for the configured universe and period, through the cache.
    pub async fn load_universe(&self) -> Result<Arc<PriceTable>> {
        let (tickers, period) = {
            let config = self.runtime_config.read();
            (config.tickers.clone(), config.period)
        };

        match self
            .price_cache
            .get_or_fetch(self.provider.as_ref(), &tickers, period)
            .await
        {
            Ok(table) => {
                let missing: Vec<&String> = tickers.iter().filter(|t| !table.contains(t)).collect();
                if !missing.is_empty() {
                    warn!(missing = ?missing, "tickers without data in price table");
                }
                Ok(table)
            }
            Err(e) => {
                self.push_error_with_code(format!("{e:#}"), Some("provider".to_string()));
                Err(e)
            }
        }
    }

    /// Drop cached tables so the next request refetches.
    pub fn refresh(&self) -> usize {
        let removed = self.price_cache.invalidate_all();
        self.increment_version();
        removed
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error with an optional machine-readable code.  The ring is
    /// capped at [`MAX_RECENT_ERRORS`]; the oldest entries are evicted.
    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn build_status(&self) -> StatusSnapshot {
        let config = self.runtime_config.read();
        StatusSnapshot {
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            server_time: Utc::now().timestamp_millis(),
            tickers: config.tickers.clone(),
            period: config.period,
            cache: self.price_cache.stats(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}
