// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Every handler pulls a price-table
// snapshot through the cache and hands it to the pure analytics engines.
// Engine errors are mapped onto status codes here and never abort the server:
//
//   NotFound            -> 404
//   InsufficientOverlap -> 422  ("insufficient overlapping data")
//   InsufficientHistory -> 422
//   provider failure    -> 502
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analytics::{compute_correlation_with, compute_metrics_with, MetricRow, PerTickerMetrics};
use crate::api::views::{ChartPayload, HeatmapPayload, KpiSummary};
use crate::app_state::AppState;
use crate::error::AnalyticsError;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/tickers", get(tickers))
        .route("/api/v1/metrics/:ticker", get(metrics))
        .route("/api/v1/summary/:ticker", get(summary))
        .route("/api/v1/data/:ticker", get(data))
        .route("/api/v1/charts/:ticker", get(charts))
        .route("/api/v1/correlation", get(correlation))
        .route("/api/v1/refresh", post(refresh))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

/// JSON error response: `{ "error": "...", "code": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

impl ApiError {
    /// Provider failures are already recorded by `AppState::load_universe`.
    fn provider(err: anyhow::Error) -> Self {
        warn!(error = %err, "price data unavailable");
        Self {
            status: StatusCode::BAD_GATEWAY,
            code: "provider",
            message: format!("market data unavailable: {err:#}"),
        }
    }

    fn analytics(state: &AppState, err: AnalyticsError) -> Self {
        let (status, code, message) = match &err {
            AnalyticsError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Error loading data for this ticker: {err}"),
            ),
            AnalyticsError::InsufficientOverlap { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_overlap",
                format!("Correlation unavailable: {err}"),
            ),
            AnalyticsError::InsufficientHistory { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_history",
                err.to_string(),
            ),
            AnalyticsError::MalformedSeries { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "malformed_series",
                err.to_string(),
            ),
        };
        warn!(code, error = %err, "analytics request failed");
        state.push_error_with_code(message.clone(), Some(code.to_string()));
        Self {
            status,
            code,
            message,
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Load the universe and run the per-ticker engine for `ticker`.
async fn ticker_metrics(state: &AppState, ticker: &str) -> Result<PerTickerMetrics, ApiError> {
    let ticker = ticker.trim().to_uppercase();
    let table = state
        .load_universe()
        .await
        .map_err(ApiError::provider)?;
    let windows = state.runtime_config.read().windows;
    compute_metrics_with(&table, &ticker, &windows).map_err(|e| ApiError::analytics(state, e))
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "snapshot": state.build_status(),
    }))
}

// =============================================================================
// Universe
// =============================================================================

async fn tickers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.runtime_config.read();
    Json(serde_json::json!({
        "tickers": config.tickers,
        "period": config.period,
        "windows": config.windows,
        "overlap_policy": config.overlap_policy,
    }))
}

// =============================================================================
// Per-ticker views
// =============================================================================

#[derive(Serialize)]
struct MetricsResponse {
    summary: KpiSummary,
    metrics: PerTickerMetrics,
}

async fn metrics(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<MetricsResponse> {
    let metrics = ticker_metrics(&state, &ticker).await?;
    Ok(Json(MetricsResponse {
        summary: KpiSummary::from_metrics(&metrics),
        metrics,
    }))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<KpiSummary> {
    let metrics = ticker_metrics(&state, &ticker).await?;
    Ok(Json(KpiSummary::from_metrics(&metrics)))
}

#[derive(Deserialize)]
struct TailQuery {
    #[serde(default)]
    tail: Option<usize>,
}

#[derive(Serialize)]
struct DataResponse {
    ticker: String,
    total_rows: usize,
    rows: Vec<MetricRow>,
}

async fn data(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<TailQuery>,
) -> ApiResult<DataResponse> {
    let metrics = ticker_metrics(&state, &ticker).await?;
    let tail = query
        .tail
        .unwrap_or_else(|| state.runtime_config.read().tail_rows);
    Ok(Json(DataResponse {
        ticker: metrics.ticker.clone(),
        total_rows: metrics.rows.len(),
        rows: metrics.tail(tail).to_vec(),
    }))
}

async fn charts(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<ChartPayload> {
    let metrics = ticker_metrics(&state, &ticker).await?;
    let highlight = state.runtime_config.read().highlight.clone();
    Ok(Json(ChartPayload::from_metrics(&metrics, highlight.as_ref())))
}

// =============================================================================
// Correlation heatmap
// =============================================================================

async fn correlation(State(state): State<Arc<AppState>>) -> ApiResult<HeatmapPayload> {
    let table = state
        .load_universe()
        .await
        .map_err(ApiError::provider)?;
    let (universe, policy) = {
        let config = state.runtime_config.read();
        (config.tickers.clone(), config.overlap_policy)
    };
    let matrix =
        compute_correlation_with(&table, &universe, policy).map_err(|e| ApiError::analytics(&state, e))?;
    Ok(Json(HeatmapPayload::from_matrix(&matrix)))
}

// =============================================================================
// Refresh
// =============================================================================

async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let removed = state.refresh();
    info!(removed, "price cache cleared via API");
    Json(serde_json::json!({
        "status": "ok",
        "cleared": removed,
        "state_version": state.current_state_version(),
    }))
}

// =============================================================================
// Tests
// =============================================================================
