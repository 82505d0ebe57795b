// =============================================================================
// Yahoo Finance Chart Client: daily adjusted OHLC bars
// =============================================================================
//
// Public endpoint, no signing.  One request per ticker:
//
//   GET /v8/finance/chart/{ticker}?range=5y&interval=1d&includeAdjustedClose=true
//
// Bars are adjusted for splits and dividends by scaling open/high/low/close
// with the `adjclose / close` ratio of each row.  Rows carrying a null field
// (halted sessions, partial last bar) are skipped.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use futures_util::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use crate::market_data::{PriceBar, PriceProvider, PriceSeries, PriceTable};
use crate::types::LookbackPeriod;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo rejects requests without a browser-like agent string.
const AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) techvol-dashboard/1.0";

#[derive(Clone)]
pub struct YahooChartClient {
    base_url: String,
    client: reqwest::Client,
}

impl YahooChartClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "YahooChartClient initialised");

        Self { base_url, client }
    }

    /// GET the chart for one ticker and parse it into a series.
    #[instrument(skip(self), name = "yahoo::fetch_series")]
    pub async fn fetch_series(&self, ticker: &str, period: LookbackPeriod) -> Result<PriceSeries> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval=1d&includeAdjustedClose=true",
            self.base_url, ticker, period
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET chart for {ticker} failed"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("failed to read chart response for {ticker}"))?;
        let body = decode_chart_body(ticker, status, &text)?;

        let series = parse_chart(ticker, &body)?;
        debug!(ticker, rows = series.len(), "chart fetched");
        Ok(series)
    }
}

#[async_trait]
impl PriceProvider for YahooChartClient {
    async fn fetch(&self, tickers: &[String], period: LookbackPeriod) -> Result<PriceTable> {
        let requests = tickers.iter().map(|t| self.fetch_series(t, period));
        let results = join_all(requests).await;

        let mut table = PriceTable::new();
        for (ticker, result) in tickers.iter().zip(results) {
            match result {
                Ok(series) if series.is_empty() => {
                    warn!(ticker = %ticker, "chart returned no usable rows, ticker skipped");
                }
                Ok(series) => table.insert(series),
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "ticker fetch failed, ticker skipped");
                }
            }
        }

        if table.is_empty() && !tickers.is_empty() {
            anyhow::bail!("no ticker of {} could be fetched", tickers.len());
        }

        info!(
            requested = tickers.len(),
            fetched = table.len(),
            period = %period,
            "price table assembled"
        );
        Ok(table)
    }
}

impl std::fmt::Debug for YahooChartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooChartClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Check the HTTP status before decoding, so a non-JSON error page (rate
/// limit, gateway error) still reports the status it came with.
fn decode_chart_body(ticker: &str, status: StatusCode, text: &str) -> Result<serde_json::Value> {
    if !status.is_success() {
        let detail = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .map(|v| v["chart"]["error"].to_string())
            .unwrap_or_else(|| text.chars().take(200).collect());
        anyhow::bail!("chart endpoint returned {} for {}: {}", status, ticker, detail);
    }
    serde_json::from_str(text).with_context(|| format!("failed to parse chart response for {ticker}"))
}

/// Parse the `chart.result[0]` envelope into an adjusted daily series.
///
/// Expected shape:
/// ```json
/// { "chart": { "result": [ {
///     "meta": { "gmtoffset": -14400 },
///     "timestamp": [1700000000, ...],
///     "indicators": {
///         "quote": [ { "open": [...], "high": [...], "low": [...], "close": [...] } ],
///         "adjclose": [ { "adjclose": [...] } ]
///     } } ], "error": null } }
/// ```
pub fn parse_chart(ticker: &str, body: &serde_json::Value) -> Result<PriceSeries> {
    let result = body["chart"]["result"]
        .as_array()
        .and_then(|arr| arr.first())
        .with_context(|| format!("chart response for {ticker} has no result"))?;

    let gmtoffset = result["meta"]["gmtoffset"].as_i64().unwrap_or(0);

    let timestamps = match result["timestamp"].as_array() {
        Some(ts) => ts,
        // A valid ticker with no trading days in range.
        None => return Ok(PriceSeries::from_unsorted(ticker, Vec::new())?),
    };

    let quote = &result["indicators"]["quote"][0];
    let opens = column(quote, "open", ticker)?;
    let highs = column(quote, "high", ticker)?;
    let lows = column(quote, "low", ticker)?;
    let closes = column(quote, "close", ticker)?;
    let adjcloses = result["indicators"]["adjclose"][0]["adjclose"].as_array();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(date) = ts.as_i64().and_then(|t| trading_date(t, gmtoffset)) else {
            warn!(ticker, index = i, "skipping row with invalid timestamp");
            continue;
        };

        let values = (
            value_at(opens, i),
            value_at(highs, i),
            value_at(lows, i),
            value_at(closes, i),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = values else {
            continue;
        };

        let ratio = match adjcloses.and_then(|a| value_at(a, i)) {
            Some(adj) if close != 0.0 => adj / close,
            _ => 1.0,
        };

        bars.push(PriceBar::new(
            date,
            open * ratio,
            high * ratio,
            low * ratio,
            close * ratio,
        ));
    }

    Ok(PriceSeries::from_unsorted(ticker, bars)?)
}

fn column<'a>(quote: &'a serde_json::Value, name: &str, ticker: &str) -> Result<&'a Vec<serde_json::Value>> {
    quote[name]
        .as_array()
        .with_context(|| format!("chart response for {ticker} is missing quote.{name}"))
}

fn value_at(values: &[serde_json::Value], i: usize) -> Option<f64> {
    values.get(i).and_then(serde_json::Value::as_f64).filter(|v| v.is_finite())
}

/// Exchange-local calendar date of a bar timestamp.
fn trading_date(timestamp: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmtoffset, 0).map(|dt| dt.date_naive())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
