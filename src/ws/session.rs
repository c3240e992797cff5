//! Per-connection session state machine.
//!
//! A [`Session`] drives one websocket from registration to removal:
//!
//! ```text
//! CONNECTING ──register──▶ OPEN ──close / error──▶ CLOSING ──unregister──▶ CLOSED
//! ```
//!
//! While open it counts inbound text messages and answers each with
//! `{"count": n}`. Every outbound frame goes through the connection's
//! [`OutboundPort`], so replies and heartbeats are never interleaved.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};

use super::messages::ServerMessage;
use crate::domain::{ConnectionId, ConnectionRegistry, OutboundPort};
use crate::metrics::{self, ErrorKind};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade accepted, not yet registered.
    Connecting,
    /// Registered and receiving.
    Open,
    /// Sending the farewell and leaving the registry.
    Closing,
    /// Terminal.
    Closed,
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the socket failed.
    ReceiveFailed,
    /// Writing a reply failed.
    SendFailed,
    /// The session could not be registered.
    RegisterFailed,
}

/// What a finished session reports back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// The session's registry key.
    pub id: ConnectionId,
    /// Text messages counted.
    pub total: u64,
    /// Why the session ended.
    pub reason: CloseReason,
    /// Whether this session removed its own registry entry. `false` when a
    /// shutdown drain got there first.
    pub unregistered: bool,
}

/// One websocket connection's receive/reply loop.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    port: Arc<OutboundPort>,
    client: Option<SocketAddr>,
    farewell_timeout: Duration,
    state: SessionState,
    count: u64,
}

impl Session {
    /// Creates a session with a fresh [`ConnectionId`].
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        port: Arc<OutboundPort>,
        farewell_timeout: Duration,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            registry,
            port,
            client: None,
            farewell_timeout,
            state: SessionState::Connecting,
            count: 0,
        }
    }

    /// Attaches the peer address, used only for logging.
    #[must_use]
    pub fn with_client(mut self, client: SocketAddr) -> Self {
        self.client = Some(client);
        self
    }

    /// Returns this session's id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the number of text messages counted so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Runs the session to completion.
    ///
    /// Registers before the first receive, and on any exit path attempts a
    /// bounded farewell and removes the registry entry, so no error can
    /// leave a dead session registered.
    pub async fn run<S>(mut self, mut inbound: S) -> SessionSummary
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        if let Err(e) = self.registry.register(self.id, Arc::clone(&self.port)).await {
            metrics::record_error(ErrorKind::Register);
            tracing::error!(conn_id = %self.id, error = %e, "ws register failed");
            self.state = SessionState::Closed;
            return self.summary(CloseReason::RegisterFailed, false);
        }
        self.state = SessionState::Open;
        tracing::info!(conn_id = %self.id, client = ?self.client, "ws connect");

        let reason = self.receive_loop(&mut inbound).await;
        let unregistered = self.close().await;
        self.summary(reason, unregistered)
    }

    async fn receive_loop<S>(&mut self, inbound: &mut S) -> CloseReason
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        loop {
            match inbound.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Some(reply) = self.on_text(text.as_str()) else {
                        continue;
                    };
                    if let Err(e) = self.port.send_json(&reply).await {
                        metrics::record_error(ErrorKind::Send);
                        tracing::warn!(conn_id = %self.id, error = %e, "ws reply failed");
                        return CloseReason::SendFailed;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return CloseReason::PeerClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    metrics::record_error(ErrorKind::Receive);
                    tracing::warn!(conn_id = %self.id, error = %e, "ws receive failed");
                    return CloseReason::ReceiveFailed;
                }
            }
        }
    }

    /// Counts a text payload and returns the reply, or `None` for an empty
    /// payload, which is ignored.
    fn on_text(&mut self, text: &str) -> Option<ServerMessage> {
        if text.is_empty() {
            return None;
        }
        self.count += 1;
        metrics::record_message();
        Some(ServerMessage::Count { count: self.count })
    }

    /// CLOSING: best-effort farewell, then leave the registry.
    async fn close(&mut self) -> bool {
        self.state = SessionState::Closing;

        if let Ok(frame) = ServerMessage::bye(self.count).to_frame() {
            let _ = self.port.send_within(frame, self.farewell_timeout).await;
        }

        let unregistered = self.registry.unregister(self.id).await;
        self.state = SessionState::Closed;
        tracing::info!(
            conn_id = %self.id,
            client = ?self.client,
            total = self.count,
            "ws disconnect"
        );
        unregistered
    }

    const fn summary(&self, reason: CloseReason, unregistered: bool) -> SessionSummary {
        SessionSummary {
            id: self.id,
            total: self.count,
            reason,
            unregistered,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use futures_util::stream;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use tokio::sync::mpsc;

    use super::*;
    use crate::test_support::{channel_port, failing_port, gauge_value, metric_value, text_of};

    const FAREWELL: Duration = Duration::from_millis(200);

    fn inbound(
        frames: Vec<Result<Message, axum::Error>>,
    ) -> impl Stream<Item = Result<Message, axum::Error>> + Unpin {
        stream::iter(frames)
    }

    fn drain_frames(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(text_of(&frame));
        }
        out
    }

    #[tokio::test]
    async fn replies_count_in_order_then_says_bye() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, mut rx) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);
        let id = session.id();

        let summary = session
            .run(inbound(vec![
                Ok(Message::text("msg1")),
                Ok(Message::text("msg2")),
                Ok(Message::text("msg3")),
                Ok(Message::Close(None)),
            ]))
            .await;

        assert_eq!(
            drain_frames(&mut rx),
            vec![
                r#"{"count":1}"#,
                r#"{"count":2}"#,
                r#"{"count":3}"#,
                r#"{"bye":true,"total":3}"#,
            ]
        );
        assert_eq!(summary.id, id);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert!(summary.unregistered);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn ignores_empty_binary_and_control_frames() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, mut rx) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);

        let summary = session
            .run(inbound(vec![
                Ok(Message::text("")),
                Ok(Message::binary(vec![1u8, 2, 3])),
                Ok(Message::Ping(axum::body::Bytes::new())),
                Ok(Message::text("hello")),
            ]))
            .await;

        assert_eq!(summary.total, 1);
        assert_eq!(
            drain_frames(&mut rx),
            vec![r#"{"count":1}"#, r#"{"bye":true,"total":1}"#]
        );
    }

    #[tokio::test]
    async fn end_of_stream_is_a_disconnect() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, _rx) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);

        let summary = session.run(inbound(Vec::new())).await;
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(summary.total, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn receive_error_unregisters() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, mut rx) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);

        let summary = session
            .run(inbound(vec![
                Ok(Message::text("a")),
                Err(axum::Error::new(std::io::Error::other("reset"))),
                Ok(Message::text("never read")),
            ]))
            .await;

        assert_eq!(summary.reason, CloseReason::ReceiveFailed);
        assert_eq!(summary.total, 1);
        assert!(registry.is_empty().await);
        // The farewell is still attempted after a receive failure.
        let frames = drain_frames(&mut rx);
        assert_eq!(frames.last().map(String::as_str), Some(r#"{"bye":true,"total":1}"#));
    }

    #[tokio::test]
    async fn send_error_unregisters() {
        let registry = Arc::new(ConnectionRegistry::new());
        let session = Session::new(Arc::clone(&registry), Arc::new(failing_port()), FAREWELL);

        let summary = session
            .run(inbound(vec![Ok(Message::text("a")), Ok(Message::text("b"))]))
            .await;

        assert_eq!(summary.reason, CloseReason::SendFailed);
        assert_eq!(summary.total, 1);
        assert!(summary.unregistered);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn registered_while_open() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, mut out) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);
        let id = session.id();
        assert_eq!(session.state(), SessionState::Connecting);

        let (tx, rx) = mpsc::unbounded_channel::<Result<Message, axum::Error>>();
        let inbound = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) });
        let task = tokio::spawn(session.run(Box::pin(inbound)));

        let _ = tx.send(Ok(Message::text("x")));
        let Some(first) = out.recv().await else {
            panic!("expected reply");
        };
        assert_eq!(text_of(&first), r#"{"count":1}"#);
        assert!(registry.contains(id).await);
        assert_eq!(registry.active_count().await, 1);

        drop(tx);
        let Ok(summary) = task.await else {
            panic!("session task panicked");
        };
        assert!(summary.unregistered);
        assert!(!registry.contains(id).await);
    }

    #[tokio::test]
    async fn drained_session_does_not_unregister_twice() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, mut out) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);

        let (tx, rx) = mpsc::unbounded_channel::<Result<Message, axum::Error>>();
        let inbound = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) });
        let task = tokio::spawn(session.run(Box::pin(inbound)));

        let _ = tx.send(Ok(Message::text("x")));
        let _ = out.recv().await;

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 1);

        let _ = tx.send(Ok(Message::Close(None)));
        let Ok(summary) = task.await else {
            panic!("session task panicked");
        };
        assert!(!summary.unregistered);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn disconnect_lowers_active_gauge_by_one() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let registry = Arc::new(ConnectionRegistry::new());
        let (other, _other_rx) = channel_port();
        let Ok(_) = registry.register(ConnectionId::new(), Arc::new(other)).await else {
            panic!("register failed");
        };

        let (port, mut out) = channel_port();
        let session = Session::new(Arc::clone(&registry), Arc::new(port), FAREWELL);
        let (tx, rx) = mpsc::unbounded_channel::<Result<Message, axum::Error>>();
        let inbound = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) });
        let task = tokio::spawn(session.run(Box::pin(inbound)));

        let _ = tx.send(Ok(Message::text("x")));
        let _ = out.recv().await;
        assert_eq!(gauge_value(&snapshotter, "ws_active_connections"), Some(2.0));

        let _ = tx.send(Ok(Message::Close(None)));
        let Ok(summary) = task.await else {
            panic!("session task panicked");
        };
        assert!(summary.unregistered);
        assert_eq!(gauge_value(&snapshotter, "ws_active_connections"), Some(1.0));

        let Some(DebugValue::Counter(messages)) = metric_value(&snapshotter, "ws_messages_total")
        else {
            panic!("ws_messages_total not recorded");
        };
        assert_eq!(messages, 1);
    }

    #[tokio::test]
    async fn send_failure_is_counted() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let registry = Arc::new(ConnectionRegistry::new());
        let session = Session::new(Arc::clone(&registry), Arc::new(failing_port()), FAREWELL);
        let summary = session.run(inbound(vec![Ok(Message::text("a"))])).await;

        assert_eq!(summary.reason, CloseReason::SendFailed);
        assert_eq!(gauge_value(&snapshotter, "ws_active_connections"), Some(0.0));
        let Some(DebugValue::Counter(errors)) = metric_value(&snapshotter, "ws_errors_total") else {
            panic!("ws_errors_total not recorded");
        };
        assert_eq!(errors, 1);
    }

    #[test]
    fn on_text_counts_only_non_empty() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (port, _rx) = channel_port();
        let mut session = Session::new(registry, Arc::new(port), FAREWELL);

        assert_eq!(session.on_text(""), None);
        assert_eq!(session.on_text("a"), Some(ServerMessage::Count { count: 1 }));
        assert_eq!(session.on_text("b"), Some(ServerMessage::Count { count: 2 }));
        assert_eq!(session.count(), 2);
    }
}
