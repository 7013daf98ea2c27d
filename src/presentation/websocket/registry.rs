//! Connection Registry
//!
//! Tracks every live collaboration connection with its authenticated user,
//! joined session, and liveness bookkeeping. All transport sends funnel
//! through the registered `Connection`, which owns the outbound channel.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::domain::UserIdentity;

/// Opaque connection identifier, generated at accept time.
pub type ConnectionId = Uuid;

/// Frame handed to a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Serialize and send a protocol message
    Frame(ServerMessage),
    /// Send a close frame with the given code and stop writing
    Close(u16),
}

/// Liveness bookkeeping for the heartbeat monitor.
#[derive(Debug)]
struct Liveness {
    /// A probe was sent and no `server_pong` has arrived since
    awaiting_pong: bool,
    /// Consecutive probe intervals without a pong
    missed_probes: u32,
    last_pong: Instant,
}

/// One live, authenticated collaboration connection.
pub struct Connection {
    pub id: ConnectionId,
    pub user: UserIdentity,
    /// The scan-document id this connection is a member of
    pub session_id: String,
    sender: mpsc::UnboundedSender<Outbound>,
    liveness: Mutex<Liveness>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        user: UserIdentity,
        session_id: impl Into<String>,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id,
            user,
            session_id: session_id.into(),
            sender,
            liveness: Mutex::new(Liveness {
                awaiting_pong: false,
                missed_probes: 0,
                last_pong: Instant::now(),
            }),
        }
    }

    /// Best-effort send. A closed channel means the writer task is gone;
    /// the failure is swallowed and eviction happens via the heartbeat
    /// cleanup path.
    pub fn send(&self, message: ServerMessage) -> bool {
        let delivered = self.sender.send(Outbound::Frame(message)).is_ok();
        if !delivered {
            tracing::debug!(connection_id = %self.id, "Dropped frame for closed connection");
        }
        delivered
    }

    /// Ask the writer task to close the transport with `code`.
    pub fn close(&self, code: u16) {
        let _ = self.sender.send(Outbound::Close(code));
    }

    /// Record a `server_pong` from the peer.
    pub fn note_pong(&self) {
        let mut liveness = self.liveness.lock();
        liveness.awaiting_pong = false;
        liveness.missed_probes = 0;
        liveness.last_pong = Instant::now();
    }

    /// Account one heartbeat tick. Returns `true` when the connection has
    /// missed `max_missed` consecutive probe intervals and must be evicted.
    pub fn register_probe(&self, max_missed: u32) -> bool {
        let mut liveness = self.liveness.lock();
        if liveness.awaiting_pong {
            liveness.missed_probes += 1;
        }
        if liveness.missed_probes >= max_missed {
            return true;
        }
        liveness.awaiting_pong = true;
        false
    }

    /// Seconds since the last liveness acknowledgment.
    pub fn seconds_since_pong(&self) -> u64 {
        self.liveness.lock().last_pong.elapsed().as_secs()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Registry of all live connections, keyed by connection id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection. Returns `None` when it was already removed,
    /// which makes disconnect paths idempotent.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Stable copy of the live set, for the heartbeat sweep.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
