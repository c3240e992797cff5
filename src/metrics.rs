//! Metric definitions for the websocket gateway.
//!
//! All series use the `ws_` prefix and Prometheus naming conventions
//! (`_total` for counters, `_seconds` for durations). The functions here are
//! thin wrappers over the `metrics` facade: until [`init_metrics_recorder`]
//! installs a recorder they are no-ops, which keeps tests and library users
//! free of global state.
//!
//! # Cardinality
//!
//! The only label is `kind` on `ws_errors_total`, bounded by [`ErrorKind`].

use std::time::Duration;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::GatewayError;

/// Where an error was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading from a websocket failed.
    Receive,
    /// Writing a reply to a websocket failed.
    Send,
    /// A heartbeat send failed or timed out.
    Heartbeat,
    /// A connection could not be registered.
    Register,
}

impl ErrorKind {
    /// Label value used on `ws_errors_total`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Send => "send",
            Self::Heartbeat => "heartbeat",
            Self::Register => "register",
        }
    }
}

/// Installs the global Prometheus recorder and returns the handle used by
/// `GET /metrics`.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, GatewayError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| GatewayError::Internal(format!("failed to install metrics recorder: {e}")))
}

/// Counts one processed inbound text message.
///
/// Metric: `ws_messages_total`
pub fn record_message() {
    counter!("ws_messages_total").increment(1);
}

/// Publishes the number of registered connections.
///
/// Metric: `ws_active_connections`
pub fn set_connections_active(count: usize) {
    // usize to f64 is exact for any realistic connection count (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("ws_active_connections").set(count as f64);
}

/// Counts `n` errors of the given kind.
///
/// Metric: `ws_errors_total`
/// Labels: `kind`
pub fn record_errors(kind: ErrorKind, n: usize) {
    if n > 0 {
        counter!("ws_errors_total", "kind" => kind.as_str()).increment(n as u64);
    }
}

/// Counts a single error of the given kind.
pub fn record_error(kind: ErrorKind) {
    record_errors(kind, 1);
}

/// Counts one completed heartbeat round.
///
/// Metric: `ws_heartbeat_rounds_total`
pub fn record_heartbeat_round() {
    counter!("ws_heartbeat_rounds_total").increment(1);
}

/// Records how long the last shutdown took.
///
/// Metric: `ws_last_shutdown_seconds`
pub fn set_last_shutdown_duration(duration: Duration) {
    gauge!("ws_last_shutdown_seconds").set(duration.as_secs_f64());
}
