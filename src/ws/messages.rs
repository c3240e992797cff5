//! Frames the gateway writes to websocket clients.

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Reason sent with the close frame during shutdown drain.
pub const SHUTDOWN_CLOSE_REASON: &str = "server shutting down";

/// Server → client JSON payloads.
///
/// Serialized untagged, so each variant is a bare object:
/// `{"count":1}`, `{"ts":"2026-01-01T00:00:00Z"}`, `{"bye":true,"total":2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Reply to the n-th text message on a connection.
    Count {
        /// Running message count for this connection.
        count: u64,
    },
    /// Periodic heartbeat.
    Heartbeat {
        /// UTC time the round started (RFC 3339).
        ts: DateTime<Utc>,
    },
    /// Best-effort farewell when a session ends.
    Bye {
        /// Serialized as `true`.
        bye: ByeFlag,
        /// Messages counted over the session's lifetime.
        total: u64,
    },
}

impl ServerMessage {
    /// Builds a heartbeat stamped with the current time.
    #[must_use]
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat { ts: Utc::now() }
    }

    /// Builds the farewell for a session that counted `total` messages.
    #[must_use]
    pub const fn bye(total: u64) -> Self {
        Self::Bye {
            bye: ByeFlag,
            total,
        }
    }

    /// Encodes this payload as a websocket text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if encoding fails.
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        serde_json::to_string(self).map(Message::text)
    }
}

/// Marker for the `bye` field of a farewell; always encodes as `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByeFlag;

impl Serialize for ByeFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(true)
    }
}

/// Close frame sent to every connection still open at shutdown
/// (code 1001, "going away").
#[must_use]
pub fn shutdown_close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: Utf8Bytes::from_static(SHUTDOWN_CLOSE_REASON),
    }))
}
