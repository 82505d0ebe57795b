// =============================================================================
// Per-Ticker Metrics Engine
// =============================================================================
//
// Turns one ticker's adjusted daily bars into a per-date table of:
//
//   close, daily return, annualised 21-day volatility, SMA-50, SMA-200
//
// Pure function of its inputs.  A ticker absent from the table is reported as
// `AnalyticsError::NotFound` with no partial result.  Values that need more
// history than is available are `None` per date; only scalar reads at a fixed
// offset from the end (`one_year_return`) fail outright.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analytics::rolling::{annualize, daily_returns, rolling_mean, rolling_sample_std};
use crate::error::AnalyticsError;
use crate::market_data::PriceTable;

/// Return observations per volatility window.
pub const VOLATILITY_WINDOW: usize = 21;
/// Closes per short moving average.
pub const SMA_SHORT_WINDOW: usize = 50;
/// Closes per long moving average.
pub const SMA_LONG_WINDOW: usize = 200;
/// Trading days used to annualise volatility.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;
/// Rows between the latest close and the close one year earlier.
pub const ONE_YEAR_LOOKBACK: usize = 252;

fn default_volatility_window() -> usize {
    VOLATILITY_WINDOW
}

fn default_sma_short_window() -> usize {
    SMA_SHORT_WINDOW
}

fn default_sma_long_window() -> usize {
    SMA_LONG_WINDOW
}

fn default_trading_days_per_year() -> u32 {
    TRADING_DAYS_PER_YEAR
}

fn default_one_year_lookback() -> usize {
    ONE_YEAR_LOOKBACK
}

/// Window sizes used by the engine.  Loaded from the runtime config so they
/// can be tuned without touching the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricWindows {
    #[serde(default = "default_volatility_window")]
    pub volatility: usize,

    #[serde(default = "default_sma_short_window")]
    pub sma_short: usize,

    #[serde(default = "default_sma_long_window")]
    pub sma_long: usize,

    #[serde(default = "default_trading_days_per_year")]
    pub trading_days_per_year: u32,

    #[serde(default = "default_one_year_lookback")]
    pub one_year_lookback: usize,
}

impl Default for MetricWindows {
    fn default() -> Self {
        Self {
            volatility: VOLATILITY_WINDOW,
            sma_short: SMA_SHORT_WINDOW,
            sma_long: SMA_LONG_WINDOW,
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
            one_year_lookback: ONE_YEAR_LOOKBACK,
        }
    }
}

/// Derived values for one trading date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub daily_return: Option<f64>,
    pub volatility: Option<f64>,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
}

/// Full metrics table for one ticker, oldest row first.
#[derive(Debug, Clone, Serialize)]
pub struct PerTickerMetrics {
    pub ticker: String,
    pub windows: MetricWindows,
    pub rows: Vec<MetricRow>,
}

impl PerTickerMetrics {
    pub fn latest(&self) -> Option<&MetricRow> {
        self.rows.last()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.latest().map(|r| r.close)
    }

    pub fn latest_volatility(&self) -> Option<f64> {
        self.latest().and_then(|r| r.volatility)
    }

    /// `close[last] / close[last - lookback] - 1`.
    ///
    /// Fails with `InsufficientHistory` unless the series holds at least
    /// `lookback + 1` rows.  The index is never wrapped or clamped.
    pub fn return_over(&self, lookback: usize) -> Result<f64, AnalyticsError> {
        let available = self.rows.len();
        let Some(required) = lookback.checked_add(1) else {
            return Err(AnalyticsError::InsufficientHistory {
                required: usize::MAX,
                available,
            });
        };
        if available < required {
            return Err(AnalyticsError::InsufficientHistory {
                required,
                available,
            });
        }
        let last = available - 1;
        let latest = self.rows[last].close;
        let base = self.rows[last - lookback].close;
        Ok(latest / base - 1.0)
    }

    /// One-year return as a fraction, using the configured lookback.
    pub fn one_year_return(&self) -> Result<f64, AnalyticsError> {
        self.return_over(self.windows.one_year_lookback)
    }

    /// The last `n` rows (all rows when `n` exceeds the length).
    pub fn tail(&self, n: usize) -> &[MetricRow] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }
}

/// Compute metrics for `ticker` with the default windows.
#[cfg(test)]
pub fn compute_metrics(table: &PriceTable, ticker: &str) -> Result<PerTickerMetrics, AnalyticsError> {
    compute_metrics_with(table, ticker, &MetricWindows::default())
}

/// Compute metrics for `ticker` with explicit window sizes.
pub fn compute_metrics_with(
    table: &PriceTable,
    ticker: &str,
    windows: &MetricWindows,
) -> Result<PerTickerMetrics, AnalyticsError> {
    let series = table
        .get(ticker)
        .ok_or_else(|| AnalyticsError::not_found(ticker))?;

    let closes = series.closes();
    let returns = daily_returns(&closes);
    let volatility = rolling_sample_std(&returns, windows.volatility);
    let sma_short = rolling_mean(&closes, windows.sma_short);
    let sma_long = rolling_mean(&closes, windows.sma_long);

    let rows: Vec<MetricRow> = series
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| MetricRow {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            daily_return: returns[i],
            volatility: volatility[i].map(|s| annualize(s, windows.trading_days_per_year)),
            sma_short: sma_short[i],
            sma_long: sma_long[i],
        })
        .collect();

    debug!(ticker, rows = rows.len(), "per-ticker metrics computed");

    Ok(PerTickerMetrics {
        ticker: ticker.to_string(),
        windows: *windows,
        rows,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{constant, linear, table_of};

    #[test]
    fn absent_ticker_is_not_found() {
        let table = table_of(&[("A", linear(300, 100.0, 400.0))]);
        let err = compute_metrics(&table, "ZZZZ").unwrap_err();
        assert_eq!(err, AnalyticsError::not_found("ZZZZ"));
    }

    #[test]
    fn daily_return_matches_definition() {
        let closes = vec![100.0, 105.0, 102.0, 108.5];
        let table = table_of(&[("A", closes.clone())]);
        let m = compute_metrics(&table, "A").unwrap();

        assert!(m.rows[0].daily_return.is_none());
        for i in 1..closes.len() {
            assert_eq!(m.rows[i].daily_return, Some(closes[i] / closes[i - 1] - 1.0));
        }
    }

    #[test]
    fn volatility_defined_after_21_returns() {
        let table = table_of(&[("A", linear(60, 50.0, 80.0))]);
        let m = compute_metrics(&table, "A").unwrap();

        // Returns exist from index 1, so the first full 21-return window ends at 21.
        for (i, row) in m.rows.iter().enumerate() {
            assert_eq!(row.volatility.is_some(), i >= 21, "index {i}");
        }
    }

    #[test]
    fn volatility_is_annualised_sample_std() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + if i % 2 == 0 { 0.0 } else { 1.5 }).collect();
        let table = table_of(&[("A", closes.clone())]);
        let m = compute_metrics(&table, "A").unwrap();

        let returns: Vec<f64> = (8..=28).map(|i| closes[i] / closes[i - 1] - 1.0).collect();
        let mean = returns.iter().sum::<f64>() / 21.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 20.0;
        let expected = var.sqrt() * 252f64.sqrt();

        assert!((m.rows[28].volatility.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn constant_series_has_zero_volatility_and_flat_smas() {
        let table = table_of(&[("FLAT", constant(300, 100.0))]);
        let m = compute_metrics(&table, "FLAT").unwrap();

        for row in &m.rows {
            if let Some(v) = row.volatility {
                assert_eq!(v, 0.0);
            }
            if let Some(s) = row.sma_short {
                assert_eq!(s, 100.0);
            }
            if let Some(s) = row.sma_long {
                assert_eq!(s, 100.0);
            }
        }
        assert!(m.rows[299].volatility.is_some());
        assert!(m.rows[299].sma_long.is_some());
    }

    #[test]
    fn linear_series_smas_start_on_day_50_and_200() {
        let table = table_of(&[("A", linear(300, 100.0, 400.0))]);
        let m = compute_metrics(&table, "A").unwrap();

        for (i, row) in m.rows.iter().enumerate() {
            // Day N (1-based) is index N - 1.
            assert_eq!(row.sma_short.is_some(), i >= 49, "sma_short at {i}");
            assert_eq!(row.sma_long.is_some(), i >= 199, "sma_long at {i}");
        }
        assert!(m.rows.windows(2).all(|w| w[1].close > w[0].close));

        // SMA of a linear series is the midpoint of its window.
        let expected = (m.rows[250].close + m.rows[201].close) / 2.0;
        assert!((m.rows[250].sma_short.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn custom_windows_are_honoured() {
        let windows = MetricWindows {
            volatility: 5,
            sma_short: 3,
            sma_long: 10,
            ..MetricWindows::default()
        };
        let table = table_of(&[("A", linear(20, 10.0, 30.0))]);
        let m = compute_metrics_with(&table, "A", &windows).unwrap();

        assert!(m.rows[4].volatility.is_none());
        assert!(m.rows[5].volatility.is_some());
        assert!(m.rows[2].sma_short.is_some());
        assert!(m.rows[8].sma_long.is_none());
        assert!(m.rows[9].sma_long.is_some());
        assert_eq!(m.windows, windows);
    }

    #[test]
    fn one_year_return_requires_253_rows() {
        let short = table_of(&[("A", linear(252, 100.0, 200.0))]);
        let m = compute_metrics(&short, "A").unwrap();
        assert_eq!(
            m.one_year_return(),
            Err(AnalyticsError::InsufficientHistory {
                required: 253,
                available: 252
            })
        );

        let enough = table_of(&[("A", linear(253, 100.0, 200.0))]);
        let m = compute_metrics(&enough, "A").unwrap();
        let r = m.one_year_return().unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn one_year_return_on_tiny_series_does_not_wrap() {
        let table = table_of(&[("A", vec![10.0, 11.0])]);
        let m = compute_metrics(&table, "A").unwrap();
        assert!(matches!(
            m.one_year_return(),
            Err(AnalyticsError::InsufficientHistory { available: 2, .. })
        ));
    }

    #[test]
    fn oversized_lookback_is_insufficient_history() {
        let windows = MetricWindows {
            one_year_lookback: usize::MAX,
            ..MetricWindows::default()
        };
        let table = table_of(&[("A", linear(300, 100.0, 400.0))]);
        let m = compute_metrics_with(&table, "A", &windows).unwrap();
        assert_eq!(
            m.one_year_return(),
            Err(AnalyticsError::InsufficientHistory {
                required: usize::MAX,
                available: 300
            })
        );
    }

    #[test]
    fn latest_reads_and_tail() {
        let table = table_of(&[("A", linear(100, 1.0, 100.0))]);
        let m = compute_metrics(&table, "A").unwrap();

        assert!((m.latest_close().unwrap() - 100.0).abs() < 1e-9);
        assert!(m.latest_volatility().is_some());
        assert_eq!(m.tail(50).len(), 50);
        assert_eq!(m.tail(50)[49].date, m.rows[99].date);
        assert_eq!(m.tail(500).len(), 100);
        assert!(m.tail(0).is_empty());
    }
}
