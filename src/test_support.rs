//! Fake transports and metric readers shared by unit tests.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use axum::extract::ws::Message;
use futures_util::{Sink, sink};
use metrics_util::debugging::{DebugValue, Snapshotter};
use tokio::sync::mpsc;

use crate::domain::OutboundPort;

/// A port whose frames land in an unbounded channel.
pub(crate) fn channel_port() -> (OutboundPort, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = sink::unfold(tx, |tx, message: Message| async move {
        tx.send(message).map_err(axum::Error::new)?;
        Ok::<_, axum::Error>(tx)
    });
    (OutboundPort::new(sink), rx)
}

/// Sink whose peer is gone. Rejects every frame, however many times it is
/// asked.
struct FailingSink;

fn peer_gone() -> axum::Error {
    axum::Error::new(std::io::Error::other("peer gone"))
}

impl Sink<Message> for FailingSink {
    type Error = axum::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Err(peer_gone()))
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Err(peer_gone())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Err(peer_gone()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// A port whose peer is gone: every send fails.
pub(crate) fn failing_port() -> OutboundPort {
    OutboundPort::new(FailingSink)
}

/// Sink whose peer never reads. Never becomes ready.
struct HangingSink;

impl Sink<Message> for HangingSink {
    type Error = axum::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// A port whose peer never reads: every send hangs forever.
pub(crate) fn hanging_port() -> OutboundPort {
    OutboundPort::new(HangingSink)
}

/// Counters shared between a [`yielding_port`] and the test observing it.
#[derive(Debug, Default)]
pub(crate) struct WireStats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delivered: AtomicUsize,
}

impl WireStats {
    /// Highest number of frames ever accepted but not yet flushed.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Frames fully flushed.
    pub(crate) fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

/// Sink that yields to the scheduler between accepting a frame and
/// finishing its flush, so an unserialized caller would overlap frames.
struct YieldingSink {
    stats: Arc<WireStats>,
    frames: mpsc::UnboundedSender<Message>,
    pending: Option<Message>,
    yielded: bool,
}

impl Sink<Message> for YieldingSink {
    type Error = axum::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        let this = self.get_mut();
        let now = this.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        this.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        this.pending = Some(item);
        this.yielded = false;
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        let Some(frame) = this.pending.take() else {
            return Poll::Ready(Ok(()));
        };
        if !this.yielded {
            this.yielded = true;
            this.pending = Some(frame);
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        this.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        this.stats.delivered.fetch_add(1, Ordering::SeqCst);
        this.frames.send(frame).map_err(axum::Error::new)?;
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// A port over a [`YieldingSink`]; frames land in the returned channel.
pub(crate) fn yielding_port() -> (
    OutboundPort,
    Arc<WireStats>,
    mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(WireStats::default());
    let sink = YieldingSink {
        stats: Arc::clone(&stats),
        frames: tx,
        pending: None,
        yielded: false,
    };
    (OutboundPort::new(sink), stats, rx)
}

/// Returns the text payload of a frame, or an empty string for non-text frames.
pub(crate) fn text_of(message: &Message) -> String {
    match message {
        Message::Text(text) => text.as_str().to_string(),
        _ => String::new(),
    }
}

/// Current value of the series called `name`, ignoring labels.
pub(crate) fn metric_value(snapshotter: &Snapshotter, name: &str) -> Option<DebugValue> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.key().name() == name)
        .map(|(_, _, _, value)| value)
}

/// Current value of the gauge called `name`.
pub(crate) fn gauge_value(snapshotter: &Snapshotter, name: &str) -> Option<f64> {
    match metric_value(snapshotter, name) {
        Some(DebugValue::Gauge(value)) => Some(value.0),
        _ => None,
    }
}
