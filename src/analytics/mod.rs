// =============================================================================
// Analytics Module
// =============================================================================
//
// Pure, side-effect-free computations over a `PriceTable`.  Per-date values
// that lack history are `Option::None`; failures that concern a whole ticker
// or a whole request surface as `AnalyticsError`.

pub mod correlation;
pub mod metrics;
pub mod rolling;

pub use correlation::{compute_correlation_with, CorrelationMatrix};
pub use metrics::{compute_metrics_with, MetricRow, MetricWindows, PerTickerMetrics};

// Default-window entry points used by the engine tests.
#[cfg(test)]
pub use correlation::compute_correlation;
#[cfg(test)]
pub use metrics::compute_metrics;
