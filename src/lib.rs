//! # chat-gateway
//!
//! WebSocket session gateway: counts messages per connection, broadcasts a
//! periodic heartbeat to every open connection and drains all connections
//! within a bounded time budget on shutdown.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── Router (api/)           /ws/chat/…, /health, /ready, /metrics
//!     │
//!     ├── Session (ws/session)    one per connection
//!     ├── Heartbeat (ws/heartbeat) one background task
//!     ├── Lifecycle (lifecycle)   startup / bounded shutdown drain
//!     ├── serve (server)          readiness flip, graceful stop, drain
//!     │
//!     └── ConnectionRegistry (domain/)
//!             └── OutboundPort    per-connection serialized sink
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod server;
pub mod ws;

#[cfg(test)]
mod test_support;
