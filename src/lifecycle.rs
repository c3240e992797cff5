//! Process-wide startup and shutdown sequencing.
//!
//! [`Lifecycle::start`] creates the shutdown token and spawns the heartbeat
//! broadcaster. The readiness token is a child of the shutdown token: it is
//! cancelled as soon as a stop is requested, while connections are still
//! being served, and with the shutdown token at the latest.
//! [`Lifecycle::shutdown`] then runs, strictly in order:
//!
//! 1. cancel the shutdown token and wait (bounded) for the broadcaster, aborting it
//!    if it overruns,
//! 2. drain the registry, which also zeroes the active-connection gauge,
//! 3. send a 1001 close frame to every drained connection concurrently,
//!    bounded by the drain timeout,
//! 4. record the shutdown duration.
//!
//! The broadcaster is stopped before the drain so it cannot race new sends
//! against the registry clear. Every wait is bounded, so shutdown finishes
//! within `heartbeat_stop_timeout + drain_timeout` however many peers hang.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleSettings;
use crate::domain::{ConnectionRegistry, fan_out};
use crate::metrics;
use crate::ws::heartbeat::run_heartbeat;
use crate::ws::messages::shutdown_close_frame;

/// Outcome of [`Lifecycle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `true` if the broadcaster exited on its own within the stop timeout.
    pub heartbeat_stopped_cleanly: bool,
    /// Connections that received the close frame.
    pub closed: usize,
    /// Connections whose close frame failed or timed out.
    pub abandoned: usize,
    /// Wall-clock time the shutdown took.
    pub duration: Duration,
}

/// Owns the shutdown and readiness tokens and the heartbeat task.
#[derive(Debug)]
pub struct Lifecycle {
    registry: Arc<ConnectionRegistry>,
    settings: LifecycleSettings,
    shutdown: CancellationToken,
    readiness: CancellationToken,
    heartbeat: JoinHandle<()>,
}

impl Lifecycle {
    /// Starts the heartbeat broadcaster. Must be called from within a tokio
    /// runtime, before the listener starts accepting connections.
    #[must_use]
    pub fn start(registry: Arc<ConnectionRegistry>, settings: LifecycleSettings) -> Self {
        let shutdown = CancellationToken::new();
        let readiness = shutdown.child_token();
        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&registry),
            settings.heartbeat_interval,
            settings.heartbeat_round_timeout,
            shutdown.clone(),
        ));
        tracing::info!("lifecycle startup complete");

        Self {
            registry,
            settings,
            shutdown,
            readiness,
            heartbeat,
        }
    }

    /// Returns the token `/ready` reports on.
    ///
    /// Cancel it when the stop signal arrives so load balancers stop routing
    /// here while the listener winds down. Cancelling it does not stop the
    /// broadcaster. [`Self::shutdown`] cancels it too.
    #[must_use]
    pub fn readiness_token(&self) -> CancellationToken {
        self.readiness.clone()
    }

    /// Returns `true` until a stop is requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.readiness.is_cancelled()
    }

    /// Stops the broadcaster and drains every open connection.
    ///
    /// Consumes the lifecycle, so the shutdown signal fires exactly once.
    pub async fn shutdown(self) -> ShutdownReport {
        let started = Instant::now();
        tracing::info!("lifecycle shutdown started");

        self.shutdown.cancel();
        let heartbeat_stopped_cleanly =
            stop_heartbeat(self.heartbeat, self.settings.heartbeat_stop_timeout).await;

        let records = self.registry.drain().await;
        let deadline = Instant::now() + self.settings.drain_timeout;
        let report = fan_out(&records, &shutdown_close_frame(), deadline).await;

        let duration = started.elapsed();
        metrics::set_last_shutdown_duration(duration);
        tracing::info!(
            closed = report.delivered,
            abandoned = report.undelivered(),
            heartbeat_stopped_cleanly,
            duration_ms = duration.as_millis(),
            "lifecycle shutdown complete"
        );

        ShutdownReport {
            heartbeat_stopped_cleanly,
            closed: report.delivered,
            abandoned: report.undelivered(),
            duration,
        }
    }
}

/// Waits up to `timeout` for the heartbeat task, aborting it on overrun.
async fn stop_heartbeat(mut handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "heartbeat task ended abnormally");
            false
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis(),
                "heartbeat task did not stop in time, aborting"
            );
            handle.abort();
            false
        }
    }
}
