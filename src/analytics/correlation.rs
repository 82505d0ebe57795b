// =============================================================================
// Cross-Ticker Correlation Engine
// =============================================================================
//
// Pearson correlation of daily returns for every pair of tickers present in
// the price table, in universe order.  Tickers missing from the table are
// skipped; the matrix dimension is the number of tickers with data.
//
// Date alignment follows `OverlapPolicy`:
//   DropAnyMissing: one shared date set where every ticker has a return.
//                    An empty set fails with `InsufficientOverlap`.
//   Pairwise:       each pair uses the dates both of its tickers share.
//
// Each pair is computed once and mirrored; the diagonal is exactly 1.0.  A
// pair with fewer than two observations or a flat series is `None`, which
// leaves every other pair untouched.
// =============================================================================

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, trace};

use crate::analytics::rolling::daily_returns;
use crate::error::AnalyticsError;
use crate::market_data::{PriceSeries, PriceTable};
use crate::types::OverlapPolicy;

/// Symmetric correlation matrix indexed by `tickers` on both axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    /// `values[i][j]` is the correlation of `tickers[i]` and `tickers[j]`.
    pub values: Vec<Vec<Option<f64>>>,
    /// Number of return observations behind each entry.
    pub observations: Vec<Vec<usize>>,
    pub policy: OverlapPolicy,
}

impl CorrelationMatrix {
    fn empty(policy: OverlapPolicy) -> Self {
        Self {
            tickers: Vec::new(),
            values: Vec::new(),
            observations: Vec::new(),
            policy,
        }
    }
}

#[cfg(test)]
impl CorrelationMatrix {
    pub fn dim(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Correlation between two tickers, `None` if either is absent or the
    /// pair is undefined.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        self.values[i][j]
    }
}

/// Correlate the universe with the drop-any-missing policy.
#[cfg(test)]
pub fn compute_correlation(
    table: &PriceTable,
    universe: &[String],
) -> Result<CorrelationMatrix, AnalyticsError> {
    compute_correlation_with(table, universe, OverlapPolicy::DropAnyMissing)
}

pub fn compute_correlation_with(
    table: &PriceTable,
    universe: &[String],
    policy: OverlapPolicy,
) -> Result<CorrelationMatrix, AnalyticsError> {
    let mut seen = HashSet::new();
    let mut included: Vec<&PriceSeries> = Vec::new();
    for ticker in universe {
        if !seen.insert(ticker.as_str()) {
            continue;
        }
        match table.get(ticker) {
            Some(series) => included.push(series),
            None => debug!(ticker = %ticker, "ticker absent from price table, excluded from correlation"),
        }
    }

    if included.is_empty() {
        return Ok(CorrelationMatrix::empty(policy));
    }

    let returns: Vec<BTreeMap<NaiveDate, f64>> = included.iter().map(|s| dated_returns(s)).collect();
    let tickers: Vec<String> = included.iter().map(|s| s.ticker().to_string()).collect();
    let n = tickers.len();

    let mut values = vec![vec![None; n]; n];
    let mut observations = vec![vec![0usize; n]; n];

    match policy {
        OverlapPolicy::DropAnyMissing => {
            let common: Vec<NaiveDate> = returns[0]
                .keys()
                .filter(|date| returns[1..].iter().all(|r| r.contains_key(*date)))
                .copied()
                .collect();

            if common.is_empty() && n > 1 {
                return Err(AnalyticsError::InsufficientOverlap { tickers: n });
            }

            let columns: Vec<Vec<f64>> = returns
                .iter()
                .map(|r| common.iter().map(|d| r[d]).collect())
                .collect();

            for i in 0..n {
                for j in i..n {
                    let value = if i == j { Some(1.0) } else { pearson(&columns[i], &columns[j]) };
                    values[i][j] = value;
                    values[j][i] = value;
                    observations[i][j] = common.len();
                    observations[j][i] = common.len();
                }
            }
            debug!(tickers = n, overlap = common.len(), "correlation computed (drop-any-missing)");
        }
        OverlapPolicy::Pairwise => {
            for i in 0..n {
                values[i][i] = Some(1.0);
                observations[i][i] = returns[i].len();
                for j in (i + 1)..n {
                    let (x, y): (Vec<f64>, Vec<f64>) = returns[i]
                        .iter()
                        .filter_map(|(date, a)| returns[j].get(date).map(|b| (*a, *b)))
                        .unzip();
                    let value = pearson(&x, &y);
                    values[i][j] = value;
                    values[j][i] = value;
                    observations[i][j] = x.len();
                    observations[j][i] = x.len();
                }
            }
            debug!(tickers = n, "correlation computed (pairwise)");
        }
    }

    Ok(CorrelationMatrix {
        tickers,
        values,
        observations,
        policy,
    })
}

/// Defined daily returns of a series keyed by date.
fn dated_returns(series: &PriceSeries) -> BTreeMap<NaiveDate, f64> {
    let returns = daily_returns(&series.closes());
    series
        .bars()
        .iter()
        .zip(returns)
        .filter_map(|(bar, r)| r.map(|r| (bar.date, r)))
        .collect()
}

/// Pearson correlation of two equally long samples, clamped to [-1, 1].
///
/// Returns `None` when:
/// - The samples differ in length or hold fewer than two points.
/// - Either sample has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        trace!(x = x.len(), y = y.len(), "pearson: insufficient observations");
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}
