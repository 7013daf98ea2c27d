//! Broadcast Engine
//!
//! Fans protocol messages out to session members. Lock, unlock, and
//! update events use symmetric broadcast (no exclusion) so the requester's
//! own UI updates through the same path as everyone else's; exclusion is
//! used only for presence events where the joiner already received the
//! full snapshot.

use std::sync::Arc;

use super::messages::ServerMessage;
use super::registry::{ConnectionId, ConnectionRegistry};
use super::session::ScanSession;

/// Message fan-out over the connection registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Best-effort single send. A missing or broken connection is skipped;
    /// eviction is the heartbeat monitor's job.
    pub fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) {
        if let Some(conn) = self.registry.get(connection_id) {
            conn.send(message);
        }
    }

    /// Send to every member of `session`, optionally excluding one
    /// connection. Per-connection ordering is preserved by the outbound
    /// channel; ordering across different members is not guaranteed.
    pub fn broadcast_to_session(
        &self,
        session: &ScanSession,
        message: ServerMessage,
        exclude: Option<ConnectionId>,
    ) {
        for member_id in session.member_ids() {
            if Some(member_id) == exclude {
                continue;
            }
            self.send_to(member_id, message.clone());
        }
    }
}
