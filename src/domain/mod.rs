//! Domain layer: connection identity, the serialized outbound port and the
//! shared connection registry.
//!
//! These types carry no HTTP or routing concerns. The session handler, the
//! heartbeat broadcaster and the lifecycle orchestrator all receive an
//! explicit `Arc<ConnectionRegistry>` rather than reaching for a global.

pub mod connection_id;
pub mod outbound;
pub mod registry;

pub use connection_id::ConnectionId;
pub use outbound::{FanOutReport, OutboundPort, SendOutcome, fan_out};
pub use registry::{ConnectionRecord, ConnectionRegistry};
