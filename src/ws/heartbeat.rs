//! Heartbeat broadcaster background task.
//!
//! Every `heartbeat_interval` the task snapshots the
//! [`ConnectionRegistry`] and fans a `{"ts": ...}` frame out to every
//! connection concurrently. A round is bounded by `heartbeat_round_timeout`;
//! connections that fail or time out are counted and skipped, the rest of
//! the round is unaffected.
//!
//! # Graceful Shutdown
//!
//! The task exits as soon as its cancellation token fires, including while
//! it is waiting out the interval between rounds.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::messages::ServerMessage;
use crate::domain::{ConnectionRegistry, FanOutReport, fan_out};
use crate::metrics::{self, ErrorKind};

/// Runs one heartbeat round and returns its tally.
///
/// Returns an empty report without sending anything when no connection is
/// registered.
pub async fn broadcast_round(registry: &ConnectionRegistry, round_timeout: Duration) -> FanOutReport {
    let records = registry.snapshot().await;
    if records.is_empty() {
        return FanOutReport::default();
    }

    let frame = match ServerMessage::heartbeat_now().to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode heartbeat");
            return FanOutReport::default();
        }
    };

    let report = fan_out(&records, &frame, Instant::now() + round_timeout).await;
    metrics::record_heartbeat_round();
    metrics::record_errors(ErrorKind::Heartbeat, report.undelivered());

    if report.undelivered() > 0 {
        tracing::warn!(
            delivered = report.delivered,
            failed = report.failed,
            timed_out = report.timed_out,
            "heartbeat round partially failed"
        );
    } else {
        tracing::debug!(delivered = report.delivered, "heartbeat round complete");
    }
    report
}

/// Heartbeat loop. Returns when `cancel_token` is cancelled.
///
/// The first round runs immediately; later rounds follow `interval` after
/// the previous round finished.
#[instrument(skip_all, name = "ws.task.heartbeat")]
pub async fn run_heartbeat(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    round_timeout: Duration,
    cancel_token: CancellationToken,
) {
    tracing::info!(
        interval_ms = interval.as_millis(),
        round_timeout_ms = round_timeout.as_millis(),
        "heartbeat task started"
    );

    while !cancel_token.is_cancelled() {
        tokio::select! {
            _ = broadcast_round(&registry, round_timeout) => {}
            () = cancel_token.cancelled() => break,
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel_token.cancelled() => break,
        }
    }

    tracing::info!("heartbeat task stopped");
}
