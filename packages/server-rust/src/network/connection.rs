//! Client connection handles and registry.
//!
//! Each connection gets a bounded mpsc channel for outbound frames; the
//! receiver end belongs to the socket write loop. `ConnectionHandle`
//! implements `ReplyChannel`, so pipeline stages can answer a request
//! without knowing anything about sockets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rofilter_core::{ReplyChannel, ReplyError, ReplyFrame, ReplyHeader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::config::ConnectionConfig;

/// Unique identifier for a connection, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// A MessagePack-encoded reply frame waiting to be written.
#[derive(Debug)]
pub struct OutboundFrame(pub Vec<u8>);

/// Handle to a single client connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    /// Session bound to this connection.
    pub session_id: i64,
    tx: mpsc::Sender<OutboundFrame>,
}

impl ReplyChannel for ConnectionHandle {
    /// Frames the reply and enqueues it without blocking.
    fn send_response(&self, header: &ReplyHeader, body: Option<&[u8]>) -> Result<(), ReplyError> {
        let bytes =
            ReplyFrame::encode(*header, body).map_err(|err| ReplyError::Encode(err.to_string()))?;
        self.tx
            .try_send(OutboundFrame(bytes))
            .map_err(|err| match err {
                TrySendError::Full(_) => ReplyError::Full,
                TrySendError::Closed(_) => ReplyError::Closed,
            })
    }
}

/// Thread-safe registry of all active connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    ///
    /// Connection IDs start at 1 (0 is reserved as "no connection").
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection for `session_id`, returning its handle and the
    /// outbound frame receiver.
    pub fn register(
        &self,
        session_id: i64,
        config: &ConnectionConfig,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);

        let handle = Arc::new(ConnectionHandle { id, session_id, tx });

        self.connections.insert(id, Arc::clone(&handle));
        (handle, rx)
    }

    /// Removes a connection from the registry, returning its handle if found.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.remove(&id).map(|(_, handle)| handle)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
