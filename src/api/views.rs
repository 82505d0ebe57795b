// =============================================================================
// Presentation Payloads
// =============================================================================
//
// Read-only, chart-ready views built from engine output.  Nothing here
// computes a metric: it only reshapes `PerTickerMetrics` and
// `CorrelationMatrix` into what a page needs (KPI row, line traces, heatmap
// cells).
// =============================================================================

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::analytics::{CorrelationMatrix, MetricRow, PerTickerMetrics};
use crate::runtime_config::HighlightBand;
use crate::types::OverlapPolicy;

const NOT_AVAILABLE: &str = "n/a";

// =============================================================================
// KPI row
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct KpiDisplay {
    pub price: String,
    pub volatility: String,
    pub one_year_return: String,
}

/// Current price, current annualised volatility and 1-year return.
#[derive(Debug, Clone, Serialize)]
pub struct KpiSummary {
    pub ticker: String,
    pub as_of: Option<NaiveDate>,
    pub latest_close: Option<f64>,
    /// Annualised volatility as a fraction (0.25 = 25 %).
    pub latest_volatility: Option<f64>,
    /// One-year return in percent.
    pub one_year_return_pct: Option<f64>,
    pub display: KpiDisplay,
    /// Why a KPI is missing, one entry per missing KPI.
    pub notes: Vec<String>,
}

impl KpiSummary {
    pub fn from_metrics(metrics: &PerTickerMetrics) -> Self {
        let mut notes = Vec::new();

        let latest_close = metrics.latest_close();
        let latest_volatility = metrics.latest_volatility();
        if latest_volatility.is_none() {
            notes.push(format!(
                "volatility needs {} daily returns",
                metrics.windows.volatility
            ));
        }

        let one_year_return_pct = match metrics.one_year_return() {
            Ok(r) => Some(r * 100.0),
            Err(e) => {
                notes.push(format!("1-year return unavailable: {e}"));
                None
            }
        };

        let display = KpiDisplay {
            price: latest_close.map_or_else(|| NOT_AVAILABLE.to_string(), |c| format!("${c:.2}")),
            volatility: latest_volatility
                .map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.2}%", v * 100.0)),
            one_year_return: one_year_return_pct
                .map_or_else(|| NOT_AVAILABLE.to_string(), |r| format!("{r:.2}%")),
        };

        Self {
            ticker: metrics.ticker.clone(),
            as_of: metrics.latest().map(|r| r.date),
            latest_close,
            latest_volatility,
            one_year_return_pct,
            display,
            notes,
        }
    }
}

// =============================================================================
// Line charts
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub name: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<Option<f64>>,
}

impl Trace {
    fn from_rows(name: impl Into<String>, rows: &[MetricRow], value: impl Fn(&MetricRow) -> Option<f64>) -> Self {
        Self {
            name: name.into(),
            x: rows.iter().map(|r| r.date).collect(),
            y: rows.iter().map(value).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HighlightView {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Price + moving averages on one chart, volatility on another.
#[derive(Debug, Clone, Serialize)]
pub struct ChartPayload {
    pub ticker: String,
    pub price: Vec<Trace>,
    pub volatility: Trace,
    pub highlight: Option<HighlightView>,
}

impl ChartPayload {
    pub fn from_metrics(metrics: &PerTickerMetrics, highlight: Option<&HighlightBand>) -> Self {
        let rows = &metrics.rows;
        let windows = &metrics.windows;

        let price = vec![
            Trace::from_rows("Price", rows, |r| Some(r.close)),
            Trace::from_rows(format!("{}-Day SMA", windows.sma_short), rows, |r| r.sma_short),
            Trace::from_rows(format!("{}-Day SMA", windows.sma_long), rows, |r| r.sma_long),
        ];
        let volatility = Trace::from_rows("Volatility", rows, |r| r.volatility);

        let highlight = highlight.map(|band| HighlightView {
            label: band.label.clone(),
            start: band.start,
            end: Utc::now().date_naive(),
        });

        Self {
            ticker: metrics.ticker.clone(),
            price,
            volatility,
            highlight,
        }
    }
}

// =============================================================================
// Heatmap
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapPayload {
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub z: Vec<Vec<Option<f64>>>,
    /// Cell labels rounded to two decimals.
    pub text: Vec<Vec<String>>,
    pub zmin: f64,
    pub zmax: f64,
    pub observations: Vec<Vec<usize>>,
    pub policy: OverlapPolicy,
}

impl HeatmapPayload {
    pub fn from_matrix(matrix: &CorrelationMatrix) -> Self {
        let text = matrix
            .values
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| v.map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{v:.2}")))
                    .collect()
            })
            .collect();

        Self {
            x: matrix.tickers.clone(),
            y: matrix.tickers.clone(),
            z: matrix.values.clone(),
            text,
            zmin: -1.0,
            zmax: 1.0,
            observations: matrix.observations.clone(),
            policy: matrix.policy,
        }
    }
}
