// =============================================================================
// Rolling Window Statistics
// =============================================================================
//
// Building blocks for the per-ticker metrics engine.  Each function returns
// one output per input element; positions without a full window are `None`
// (never zero, never NaN) so a missing value cannot leak into a later
// statistic.
//
//   return_t   = close_t / close_{t-1} - 1
//   sma_t      = mean(close_{t-n+1} ..= close_t)
//   stdev_t    = sqrt( Σ (r_i - mean)² / (n - 1) )      sample, divisor n-1
//   annualised = stdev_t * sqrt(periods_per_year)
// =============================================================================

use tracing::trace;

/// Simple daily returns.  The first element is always `None`; so is any
/// return whose previous close is zero or either close is non-finite.
pub fn daily_returns(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(None);

    for pair in closes.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        let ret = if prev != 0.0 && prev.is_finite() && cur.is_finite() {
            Some(cur / prev - 1.0)
        } else {
            None
        };
        out.push(ret);
    }
    out
}

/// Trailing simple moving average over `window` values ending at each index.
///
/// # Edge cases
/// - `window == 0` => every position is `None`
/// - a non-finite value inside the window => `None` for that position
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    if values.len() < window {
        trace!(len = values.len(), window, "rolling mean: insufficient data");
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| !v.is_finite()) {
                return None;
            }
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Trailing sample standard deviation (divisor `window - 1`) over a series
/// with gaps.  A position is defined only when all `window` observations
/// ending at it are defined.
pub fn rolling_sample_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window < 2 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let observed: Vec<f64> = slice.iter().filter_map(|v| *v).collect();
            if observed.len() < window {
                return None;
            }
            sample_std(&observed)
        })
        .collect()
}

/// Sample standard deviation of a complete slice (two-pass).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();
    std.is_finite().then_some(std)
}

/// Scale a per-period standard deviation to a yearly figure.
pub fn annualize(std: f64, periods_per_year: u32) -> f64 {
    std * f64::from(periods_per_year).sqrt()
}
