//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleSettings;
use crate::domain::ConnectionRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Registry of open websocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Timing budgets; sessions read the farewell timeout from here.
    pub settings: LifecycleSettings,
    /// Cancelled once a stop has been requested; `/ready` reports on it.
    pub readiness: CancellationToken,
    /// Prometheus handle, present when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}
