//! WebSocket layer: upgrade handling, per-connection sessions, the
//! heartbeat broadcaster and the wire messages they exchange.
//!
//! Upgrades are accepted under the configured path prefix (default
//! `/ws/chat/`). Each connection is served by a [`session::Session`].

pub mod handler;
pub mod heartbeat;
pub mod messages;
pub mod session;
