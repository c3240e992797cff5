//! System endpoints: health, readiness, metrics and the fallback.

use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::GatewayError;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    ready: bool,
    active_connections: usize,
}

/// `GET /health` — Liveness.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /ready` — 200 while serving, 503 once a stop has been requested.
pub async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = !state.readiness.is_cancelled();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        ready,
        active_connections: state.registry.active_count().await,
    };
    (status, Json(body))
}

/// `GET /metrics` — Prometheus text exposition.
///
/// # Errors
///
/// Returns [`GatewayError::MetricsUnavailable`] when no recorder is installed.
#[tracing::instrument(skip_all, name = "ws.metrics.scrape")]
pub async fn metrics_handler(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let handle = state.metrics.ok_or(GatewayError::MetricsUnavailable)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

/// Fallback for every path no route claims.
pub async fn not_found_handler(uri: Uri) -> GatewayError {
    GatewayError::NotFound(uri.path().to_string())
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
}
