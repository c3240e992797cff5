//! Registry of open websocket connections.
//!
//! [`ConnectionRegistry`] maps each [`ConnectionId`] to its
//! [`ConnectionRecord`]. The map sits behind one [`tokio::sync::Mutex`]
//! that is only ever held for in-memory work: callers that need to write to
//! connections take a [`ConnectionRegistry::snapshot`] and send after the
//! lock is released, so a slow peer never blocks other sessions from
//! joining or leaving.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::ConnectionId;
use super::outbound::OutboundPort;
use crate::error::GatewayError;
use crate::metrics;

/// One registered connection: its id and its serialized outbound port.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    /// Registry key.
    pub id: ConnectionId,
    /// Shared write side of the connection.
    pub port: Arc<OutboundPort>,
}

/// Shared set of connections currently able to receive frames.
///
/// # Invariants
///
/// - An id appears at most once.
/// - The `ws_active_connections` gauge is republished after every mutation
///   and therefore always equals [`Self::len`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionRecord>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateConnection`] if `id` is already
    /// registered (never expected with UUID v4 ids).
    pub async fn register(
        &self,
        id: ConnectionId,
        port: Arc<OutboundPort>,
    ) -> Result<ConnectionRecord, GatewayError> {
        let record = ConnectionRecord { id, port };
        let mut map = self.connections.lock().await;
        if map.contains_key(&id) {
            return Err(GatewayError::DuplicateConnection(id));
        }
        map.insert(id, record.clone());
        metrics::set_connections_active(map.len());
        Ok(record)
    }

    /// Removes a connection. Returns `true` if this call removed it and
    /// `false` if it was already gone.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut map = self.connections.lock().await;
        let removed = map.remove(&id).is_some();
        if removed {
            metrics::set_connections_active(map.len());
        }
        removed
    }

    /// Returns a point-in-time copy of every registered connection.
    pub async fn snapshot(&self) -> Vec<ConnectionRecord> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Atomically empties the registry and returns what it held.
    pub async fn drain(&self) -> Vec<ConnectionRecord> {
        let mut map = self.connections.lock().await;
        let drained = map.drain().map(|(_, record)| record).collect();
        metrics::set_connections_active(0);
        drained
    }

    /// Returns `true` if `id` is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    /// Returns the number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Same as [`Self::len`]; the name used by health and metrics reporting.
    pub async fn active_count(&self) -> usize {
        self.len().await
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}
