// =============================================================================
// Presentation API
// =============================================================================
//
// HTTP/JSON surface consumed by the dashboard page:
// - REST endpoints (per-ticker metrics, KPI row, charts, correlation heatmap)
// - Chart-ready payload builders

pub mod rest;
pub mod views;
