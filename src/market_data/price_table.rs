use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One split/dividend-adjusted daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
        }
    }

    /// A bar carrying only a closing price (open/high/low mirror the close).
    #[cfg(test)]
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self::new(date, close, close, close, close)
    }
}

/// Daily bars of a single ticker.  Dates are strictly increasing and unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order or duplicated dates and closes
    /// that are not strictly positive.
    pub fn new(ticker: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, AnalyticsError> {
        let ticker = ticker.into();
        if let Some(pair) = bars.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(AnalyticsError::MalformedSeries {
                ticker,
                reason: format!("date {} does not follow {}", pair[1].date, pair[0].date),
            });
        }
        // A zero close turns the next return into infinity.
        if let Some(bar) = bars.iter().find(|b| !(b.close.is_finite() && b.close > 0.0)) {
            return Err(AnalyticsError::MalformedSeries {
                reason: format!("close {} on {} is not a positive price", bar.close, bar.date),
                ticker,
            });
        }
        Ok(Self { ticker, bars })
    }

    /// Build a series from unordered bars: sorts by date and keeps the last
    /// bar seen for any duplicated date.
    pub fn from_unsorted(ticker: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, AnalyticsError> {
        let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
        for bar in bars {
            by_date.insert(bar.date, bar);
        }
        Self::new(ticker, by_date.into_values().collect())
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PriceTable
// ---------------------------------------------------------------------------

/// Daily bars keyed by ticker.  Tickers the provider failed to deliver are
/// simply absent; series may have different lengths.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceTable {
    series: BTreeMap<String, PriceSeries>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a ticker's series.  Empty series are not stored.
    pub fn insert(&mut self, series: PriceSeries) {
        if series.is_empty() {
            return;
        }
        self.series.insert(series.ticker.clone(), series);
    }

    pub fn get(&self, ticker: &str) -> Option<&PriceSeries> {
        self.series.get(ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.series.contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Convenience constructor from `(ticker, [(date, close)])` pairs.
    #[cfg(test)]
    pub fn from_closes<I, S>(rows: I) -> Result<Self, AnalyticsError>
    where
        I: IntoIterator<Item = (S, Vec<(NaiveDate, f64)>)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (ticker, closes) in rows {
            let bars = closes
                .into_iter()
                .map(|(date, close)| PriceBar::from_close(date, close))
                .collect();
            table.insert(PriceSeries::new(ticker, bars)?);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn series_rejects_duplicate_dates() {
        let bars = vec![PriceBar::from_close(d(2), 1.0), PriceBar::from_close(d(2), 2.0)];
        let err = PriceSeries::new("AAPL", bars).unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedSeries { .. }));
    }

    #[test]
    fn series_rejects_descending_dates() {
        let bars = vec![PriceBar::from_close(d(3), 1.0), PriceBar::from_close(d(2), 2.0)];
        assert!(PriceSeries::new("AAPL", bars).is_err());
    }

    #[test]
    fn from_unsorted_sorts_and_dedupes() {
        let bars = vec![
            PriceBar::from_close(d(4), 4.0),
            PriceBar::from_close(d(2), 2.0),
            PriceBar::from_close(d(4), 5.0),
        ];
        let series = PriceSeries::from_unsorted("MSFT", bars).unwrap();
        let dates: Vec<NaiveDate> = series.bars().iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(2), d(4)]);
        assert_eq!(series.closes(), vec![2.0, 5.0]);
    }

    #[test]
    fn table_skips_empty_series() {
        let mut table = PriceTable::new();
        table.insert(PriceSeries::new("NVDA", Vec::new()).unwrap());
        assert!(table.is_empty());
        assert!(!table.contains("NVDA"));
    }

    #[test]
    fn from_closes_builds_lookup() {
        let table = PriceTable::from_closes(vec![
            ("A", vec![(d(2), 10.0), (d(3), 11.0)]),
            ("B", vec![(d(2), 20.0)]),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("A").unwrap().closes(), vec![10.0, 11.0]);
        assert!(table.contains("B"));
    }

    #[test]
    fn series_rejects_non_positive_close() {
        let bars = vec![PriceBar::from_close(d(2), 10.0), PriceBar::from_close(d(3), 0.0)];
        let err = PriceSeries::from_unsorted("INTC", bars).unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedSeries { ref ticker, .. } if ticker == "INTC"));
    }
}
