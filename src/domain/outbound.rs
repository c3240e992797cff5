//! Serialized outbound half of a websocket connection.
//!
//! [`OutboundPort`] owns the write side of one connection together with the
//! lock that serializes it. Every frame, whether it is a session reply, a
//! heartbeat or a drain close frame, goes through [`OutboundPort::send`], so
//! at most one frame is in flight per connection and frames are totally
//! ordered. Callers never see the raw sink.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::future::join_all;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};

use super::registry::ConnectionRecord;
use crate::error::GatewayError;
use crate::ws::messages::ServerMessage;

/// Type-erased frame sink. In production this is the `SplitSink` half of an
/// axum [`axum::extract::ws::WebSocket`].
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Result of a bounded, best-effort send.
///
/// Callers that only need "try and move on" semantics are free to drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was written and flushed.
    Delivered,
    /// The transport rejected the frame.
    Failed,
    /// The deadline passed before the lock was acquired or the write finished.
    TimedOut,
}

impl SendOutcome {
    /// Returns `true` if the frame reached the transport.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Tally of one concurrent fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Frames written successfully.
    pub delivered: usize,
    /// Frames rejected by the transport.
    pub failed: usize,
    /// Frames abandoned at the deadline.
    pub timed_out: usize,
}

impl FanOutReport {
    /// Total number of connections the fan-out addressed.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.failed + self.timed_out
    }

    /// Number of connections that did not receive the frame.
    #[must_use]
    pub const fn undelivered(&self) -> usize {
        self.failed + self.timed_out
    }

    fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Delivered => self.delivered += 1,
            SendOutcome::Failed => self.failed += 1,
            SendOutcome::TimedOut => self.timed_out += 1,
        }
    }
}

/// The write side of one websocket connection plus its send lock.
pub struct OutboundPort {
    sink: Mutex<FrameSink>,
}

impl fmt::Debug for OutboundPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundPort").finish_non_exhaustive()
    }
}

impl OutboundPort {
    /// Wraps a frame sink.
    #[must_use]
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Self {
            sink: Mutex::new(Box::pin(sink)),
        }
    }

    /// Writes one frame while holding this connection's send lock.
    ///
    /// The lock covers both the write and the flush, so concurrent callers
    /// (the session loop and a heartbeat round, say) are queued behind each
    /// other and their frames never interleave.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the peer is gone or the
    /// underlying socket fails.
    pub async fn send(&self, message: Message) -> Result<(), GatewayError> {
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(GatewayError::Transport)
    }

    /// Serializes `payload` to JSON and sends it as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if the payload cannot be
    /// encoded, or [`GatewayError::Transport`] if the send fails.
    pub async fn send_json(&self, payload: &ServerMessage) -> Result<(), GatewayError> {
        let text = serde_json::to_string(payload)?;
        self.send(Message::text(text)).await
    }

    /// Attempts a send that gives up at `deadline`.
    ///
    /// Waiting for the send lock counts against the deadline. Failures are
    /// reported in the returned [`SendOutcome`] and never propagated.
    pub async fn send_until(&self, message: Message, deadline: Instant) -> SendOutcome {
        match timeout_at(deadline, self.send(message)).await {
            Ok(Ok(())) => SendOutcome::Delivered,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "bounded send failed");
                SendOutcome::Failed
            }
            Err(_) => SendOutcome::TimedOut,
        }
    }

    /// Attempts a send bounded by `timeout`. See [`Self::send_until`].
    pub async fn send_within(&self, message: Message, timeout: Duration) -> SendOutcome {
        self.send_until(message, Instant::now() + timeout).await
    }
}

/// Sends `message` to every record concurrently, giving up at `deadline`.
///
/// Each send is serialized by its own connection's lock and bounded by the
/// shared deadline, so one slow or dead peer cannot hold back the others
/// and the whole call returns no later than `deadline`.
pub async fn fan_out(
    records: &[ConnectionRecord],
    message: &Message,
    deadline: Instant,
) -> FanOutReport {
    let sends = records.iter().map(|record| {
        let message = message.clone();
        async move { (record.id, record.port.send_until(message, deadline).await) }
    });

    let mut report = FanOutReport::default();
    for (id, outcome) in join_all(sends).await {
        if !outcome.is_delivered() {
            tracing::debug!(conn_id = %id, ?outcome, "fan-out send not delivered");
        }
        report.record(outcome);
    }
    report
}
