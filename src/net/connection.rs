//! Inbound connection identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Mark the single active client connection for logs and metrics

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Guard for the client connection currently being served.
///
/// Logs the connection's lifetime and clears the active gauge when dropped.
#[derive(Debug)]
pub struct ActiveConnection {
    id: ConnectionId,
    peer: SocketAddr,
    opened: Instant,
    records: u64,
}

impl ActiveConnection {
    pub fn open(peer: SocketAddr) -> Self {
        let id = ConnectionId::next();
        metrics::record_inbound_connection(true);
        tracing::info!(connection_id = %id, peer_addr = %peer, "Client connected");
        Self {
            id,
            peer,
            opened: Instant::now(),
            records: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Count one record decoded from this connection.
    pub fn record_received(&mut self) {
        self.records += 1;
    }

    pub fn records(&self) -> u64 {
        self.records
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        metrics::record_inbound_connection(false);
        tracing::info!(
            connection_id = %self.id,
            peer_addr = %self.peer,
            records = self.records,
            duration_ms = self.opened.elapsed().as_millis() as u64,
            "Client connection closed"
        );
    }
}
