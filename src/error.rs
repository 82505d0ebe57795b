// =============================================================================
// Analytics Errors
// =============================================================================
//
// Typed failures raised by the metrics and correlation engines.  Every variant
// is local to one ticker or one request: the HTTP layer maps them onto status
// codes and carries on serving the rest of the universe.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    /// The requested ticker has no rows in the supplied price table.
    #[error("no price data for ticker {ticker}")]
    NotFound { ticker: String },

    /// A scalar read needs more trailing rows than the series holds.
    #[error("insufficient history: {required} rows required, {available} available")]
    InsufficientHistory { required: usize, available: usize },

    /// No date carries a defined return for every included ticker.
    #[error("insufficient overlapping data across {tickers} tickers")]
    InsufficientOverlap { tickers: usize },

    /// Dates within a single ticker's series are not strictly increasing.
    #[error("malformed series for {ticker}: {reason}")]
    MalformedSeries { ticker: String, reason: String },
}

impl AnalyticsError {
    pub fn not_found(ticker: impl Into<String>) -> Self {
        Self::NotFound {
            ticker: ticker.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_ticker() {
        let err = AnalyticsError::not_found("ZZZZ");
        assert_eq!(err.to_string(), "no price data for ticker ZZZZ");

        let err = AnalyticsError::InsufficientHistory {
            required: 253,
            available: 100,
        };
        assert!(err.to_string().contains("253"));
        assert!(err.to_string().contains("100"));
    }
}
