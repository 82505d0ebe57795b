// =============================================================================
// Runtime Configuration: dashboard settings with atomic save
// =============================================================================
//
// Every tunable of the dashboard lives here: the ticker universe, the
// lookback period, the metric window sizes, the correlation overlap policy
// and the cache policy.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::MetricWindows;
use crate::market_data::yahoo::DEFAULT_BASE_URL;
use crate::types::{LookbackPeriod, OverlapPolicy};

pub const DEFAULT_CONFIG_PATH: &str = "dashboard_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tickers() -> Vec<String> {
    [
        "AAPL", "MSFT", "NVDA", "GOOGL", "AMZN", "META", "TSLA", "AMD", "INTC", "CRM", "ORCL",
        "ADBE", "CSCO", "NFLX", "IBM",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    8
}

fn default_provider_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_tail_rows() -> usize {
    50
}

fn default_highlight() -> Option<HighlightBand> {
    Some(HighlightBand::default())
}

// =============================================================================
// HighlightBand
// =============================================================================

/// Shaded date range drawn over the volatility chart, open-ended to today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightBand {
    pub label: String,
    pub start: NaiveDate,
}

impl Default for HighlightBand {
    fn default() -> Self {
        Self {
            label: "2024 Economic Shift".to_string(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Universe -----------------------------------------------------------

    /// Ticker universe, in display order.
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,

    /// History requested from the provider.
    #[serde(default)]
    pub period: LookbackPeriod,

    // --- Analytics ----------------------------------------------------------

    /// Window sizes for volatility, moving averages and the 1-year return.
    #[serde(default)]
    pub windows: MetricWindows,

    /// Date alignment rule for the correlation matrix.
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,

    // --- Cache --------------------------------------------------------------

    /// Seconds a fetched price table stays fresh.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached price tables.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    // --- Presentation -------------------------------------------------------

    /// Band drawn on the volatility chart (`null` disables it).
    #[serde(default = "default_highlight")]
    pub highlight: Option<HighlightBand>,

    /// Rows returned by the raw data view when no `tail` is given.
    #[serde(default = "default_tail_rows")]
    pub tail_rows: usize,

    // --- Endpoints ----------------------------------------------------------

    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tickers: default_tickers(),
            period: LookbackPeriod::default(),
            windows: MetricWindows::default(),
            overlap_policy: OverlapPolicy::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            highlight: default_highlight(),
            tail_rows: default_tail_rows(),
            provider_base_url: default_provider_base_url(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            tickers = ?config.tickers,
            period = %config.period,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Load `path`, or write the defaults there when no file exists yet.
    ///
    /// An existing file that fails to read or parse is returned as an error
    /// and never overwritten.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!(path = %path.display(), "no runtime config found, defaults written");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `DASHBOARD_*` overrides from a variable lookup.
    ///
    /// Takes the lookup as a closure so tests do not touch the process
    /// environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup("DASHBOARD_TICKERS") {
            let tickers: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !tickers.is_empty() {
                self.tickers = tickers;
            }
        }
        if let Some(period) = lookup("DASHBOARD_PERIOD") {
            self.period = period
                .parse()
                .context("invalid DASHBOARD_PERIOD")?;
        }
        if let Some(addr) = lookup("DASHBOARD_BIND_ADDR") {
            self.bind_addr = addr;
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.tickers.len(), 15);
        assert_eq!(cfg.tickers[0], "AAPL");
        assert_eq!(cfg.tickers[14], "IBM");
        assert_eq!(cfg.period, LookbackPeriod::FiveYears);
        assert_eq!(cfg.windows.volatility, 21);
        assert_eq!(cfg.windows.sma_short, 50);
        assert_eq!(cfg.windows.sma_long, 200);
        assert_eq!(cfg.windows.trading_days_per_year, 252);
        assert_eq!(cfg.windows.one_year_lookback, 252);
        assert_eq!(cfg.overlap_policy, OverlapPolicy::DropAnyMissing);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.tail_rows, 50);
        assert_eq!(cfg.highlight.unwrap().label, "2024 Economic Shift");
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.tickers.len(), 15);
        assert_eq!(cfg.windows, MetricWindows::default());
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "tickers": ["NVDA", "AMD"],
            "period": "2y",
            "windows": { "volatility": 10 },
            "overlap_policy": "Pairwise",
            "highlight": null
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.tickers, vec!["NVDA", "AMD"]);
        assert_eq!(cfg.period, LookbackPeriod::TwoYears);
        assert_eq!(cfg.windows.volatility, 10);
        assert_eq!(cfg.windows.sma_long, 200);
        assert_eq!(cfg.overlap_policy, OverlapPolicy::Pairwise);
        assert!(cfg.highlight.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("DASHBOARD_TICKERS", " aapl, msft ,,nvda "),
            ("DASHBOARD_PERIOD", "1y"),
            ("DASHBOARD_BIND_ADDR", "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();

        let mut cfg = RuntimeConfig::default();
        cfg.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.tickers, vec!["AAPL", "MSFT", "NVDA"]);
        assert_eq!(cfg.period, LookbackPeriod::OneYear);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn env_override_rejects_bad_period() {
        let mut cfg = RuntimeConfig::default();
        let result = cfg.apply_env_overrides(|k| (k == "DASHBOARD_PERIOD").then(|| "forever".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let path = std::env::temp_dir().join(format!("techvol-config-{}.json", std::process::id()));
        let mut cfg = RuntimeConfig::default();
        cfg.tickers = vec!["IBM".to_string()];
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.tickers, vec!["IBM"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_or_init_writes_defaults_when_missing() {
        let path = std::env::temp_dir().join(format!("techvol-init-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let cfg = RuntimeConfig::load_or_init(&path).unwrap();
        assert_eq!(cfg.tickers.len(), 15);
        assert_eq!(RuntimeConfig::load(&path).unwrap().tickers.len(), 15);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_or_init_leaves_malformed_file_untouched() {
        let path = std::env::temp_dir().join(format!("techvol-bad-{}.json", std::process::id()));
        let original = r#"{"tickers":["NVDA","AMD"],"period":"2y",}"#;
        std::fs::write(&path, original).unwrap();

        assert!(RuntimeConfig::load_or_init(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(RuntimeConfig::load("/nonexistent/dashboard_config.json").is_err());
    }
}
