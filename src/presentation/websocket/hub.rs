//! Collaboration Hub
//!
//! Owns the connection registry and the sessionId -> session map, and
//! coordinates every state change: admission, lock traffic, device
//! updates, and disconnect cascades. Constructed once at startup and
//! injected into the protocol dispatcher, so tests can build isolated
//! hubs with fake collaborators.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::broadcast::Broadcaster;
use super::locks::{LockAcquire, LockRelease};
use super::messages::ServerMessage;
use super::registry::{Connection, ConnectionId, ConnectionRegistry, Outbound};
use super::session::{ScanSession, SessionMember, SessionSnapshot, UpdateReject};
use crate::domain::{DeviceUpdateOutcome, LockAuthorizer, ScanRepository, UserIdentity};
use crate::shared::error::AppError;

/// Lock-failure reason reported when the device is held by someone else.
pub const REASON_LOCKED: &str = "locked";
/// Lock-failure reason reported on an update without holding the lock.
pub const REASON_NOT_HOLDER: &str = "not_lock_holder";

/// Central coordinator for all collaboration state.
pub struct CollaborationHub {
    registry: Arc<ConnectionRegistry>,
    sessions: DashMap<String, Arc<ScanSession>>,
    broadcaster: Broadcaster,
    scans: Arc<dyn ScanRepository>,
    authorizer: Arc<dyn LockAuthorizer>,
}

impl CollaborationHub {
    pub fn new(scans: Arc<dyn ScanRepository>, authorizer: Arc<dyn LockAuthorizer>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            sessions: DashMap::new(),
            scans,
            authorizer,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a live session by scan id.
    pub fn session(&self, scan_id: &str) -> Option<Arc<ScanSession>> {
        self.sessions.get(scan_id).map(|entry| entry.value().clone())
    }

    /// Admit an authenticated connection into a session.
    ///
    /// Creates the session on first join, seeding its version counter from
    /// the persisted scan. Registers the connection, broadcasts presence to
    /// the existing members, and returns the snapshot for the joiner.
    pub async fn join(
        &self,
        user: UserIdentity,
        scan_id: &str,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> (Arc<Connection>, SessionSnapshot) {
        let conn = Arc::new(Connection::new(Uuid::new_v4(), user, scan_id, sender));
        let member = SessionMember {
            connection_id: conn.id,
            user_id: conn.user.id.clone(),
            username: conn.user.username.clone(),
        };

        self.registry.insert(conn.clone());

        let (session, snapshot) = loop {
            let session = match self.session(scan_id) {
                Some(existing) => existing,
                None => {
                    let seed = self.load_seed_version(scan_id).await;
                    self.sessions
                        .entry(scan_id.to_string())
                        .or_insert_with(|| Arc::new(ScanSession::new(scan_id, seed)))
                        .value()
                        .clone()
                }
            };
            if let Some(snapshot) = session.try_join(member.clone()) {
                break (session, snapshot);
            }
            // Lost a race with the last member's teardown; drop the
            // defunct entry and retry against a fresh session.
            self.sessions.remove_if(scan_id, |_, s| s.is_defunct());
        };

        self.broadcaster.broadcast_to_session(
            &session,
            ServerMessage::UserJoined {
                user_id: conn.user.id.clone(),
                username: conn.user.username.clone(),
            },
            Some(conn.id),
        );

        tracing::info!(
            connection_id = %conn.id,
            user_id = %conn.user.id,
            scan_id = %scan_id,
            members = session.member_count(),
            "User joined session"
        );

        (conn, snapshot)
    }

    async fn load_seed_version(&self, scan_id: &str) -> u64 {
        match self.scans.find_meta(scan_id).await {
            Ok(Some(meta)) => meta.version,
            Ok(None) => 0,
            Err(err) => {
                tracing::warn!(scan_id = %scan_id, error = %err, "Version seed lookup failed");
                0
            }
        }
    }

    /// Tear down a connection: registry removal, session leave, lock
    /// release, presence + unlock broadcasts, and session teardown when
    /// the last member is gone. Idempotent; returns `false` when the
    /// connection was already gone.
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let Some(conn) = self.registry.remove(connection_id) else {
            return false;
        };

        if let Some(session) = self.session(&conn.session_id) {
            if let Some(outcome) = session.leave(connection_id) {
                for device_id in &outcome.released_devices {
                    self.broadcaster.broadcast_to_session(
                        &session,
                        ServerMessage::DeviceUnlocked {
                            device_id: device_id.clone(),
                        },
                        None,
                    );
                }
                self.broadcaster.broadcast_to_session(
                    &session,
                    ServerMessage::UserLeft {
                        user_id: outcome.member.user_id,
                        username: outcome.member.username,
                    },
                    None,
                );
                if outcome.now_empty {
                    self.sessions
                        .remove_if(&conn.session_id, |_, s| s.is_defunct());
                    tracing::info!(scan_id = %conn.session_id, "Session torn down");
                }
            }
        }

        tracing::info!(
            connection_id = %conn.id,
            user_id = %conn.user.id,
            scan_id = %conn.session_id,
            "User disconnected"
        );
        true
    }

    /// `device_lock`: atomic acquire, then symmetric broadcast on grant or
    /// a requester-only failure reply.
    pub fn handle_device_lock(&self, conn: &Connection, device_id: String) {
        let Some(session) = self.session(&conn.session_id) else {
            self.reply_error(conn, &AppError::NotFound(format!(
                "session {} not found",
                conn.session_id
            )));
            return;
        };

        match session.acquire_lock(&device_id, &Self::member_of(conn)) {
            LockAcquire::Granted => {
                tracing::debug!(
                    scan_id = %session.scan_id,
                    device_id = %device_id,
                    user_id = %conn.user.id,
                    "Device locked"
                );
                self.broadcaster.broadcast_to_session(
                    &session,
                    ServerMessage::DeviceLocked {
                        device_id,
                        user_id: conn.user.id.clone(),
                        username: conn.user.username.clone(),
                    },
                    None,
                );
            }
            LockAcquire::Held {
                holder_username, ..
            } => {
                self.broadcaster.send_to(
                    conn.id,
                    ServerMessage::DeviceLockFailed {
                        device_id,
                        reason: REASON_LOCKED.into(),
                        locked_by_username: Some(holder_username),
                    },
                );
            }
        }
    }

    /// `device_unlock`: holder releases directly; a non-holder is granted
    /// the release only when the authorization hook allows an override.
    pub async fn handle_device_unlock(&self, conn: &Connection, device_id: String) {
        let Some(session) = self.session(&conn.session_id) else {
            self.reply_error(conn, &AppError::NotFound(format!(
                "session {} not found",
                conn.session_id
            )));
            return;
        };

        match session.release_lock(&device_id, conn.id, false) {
            LockRelease::Released => {
                self.broadcast_unlocked(&session, device_id);
            }
            LockRelease::NotHeld => {
                self.reply_error(
                    conn,
                    &AppError::NotFound(format!("device {} is not locked", device_id)),
                );
            }
            LockRelease::NotHolder { holder_username } => {
                // The authorizer may hit storage; the session mutex is not
                // held across this call.
                let may_override = match self
                    .authorizer
                    .may_force_unlock(&session.scan_id, &conn.user.id)
                    .await
                {
                    Ok(allowed) => allowed,
                    Err(err) => {
                        tracing::warn!(
                            scan_id = %session.scan_id,
                            error = %err,
                            "Lock override check failed"
                        );
                        false
                    }
                };

                if !may_override {
                    self.reply_error(
                        conn,
                        &AppError::Forbidden(format!(
                            "device {} is locked by {}",
                            device_id, holder_username
                        )),
                    );
                    return;
                }

                match session.release_lock(&device_id, conn.id, true) {
                    LockRelease::Released => {
                        tracing::info!(
                            scan_id = %session.scan_id,
                            device_id = %device_id,
                            user_id = %conn.user.id,
                            "Lock force-released by scan owner"
                        );
                        self.broadcast_unlocked(&session, device_id);
                    }
                    // The holder vanished between the two attempts
                    _ => self.reply_error(
                        conn,
                        &AppError::NotFound(format!("device {} is not locked", device_id)),
                    ),
                }
            }
        }
    }

    /// `device_update`: admission (lock holdership, then version) happens
    /// synchronously under the session mutex; the persistence call runs
    /// with the mutex released so slow writes do not stall lock traffic;
    /// the version bump and broadcast re-enter the mutex afterwards.
    pub async fn handle_device_update(
        &self,
        conn: &Connection,
        device_id: String,
        changes: serde_json::Value,
        expected_version: u64,
    ) {
        let Some(session) = self.session(&conn.session_id) else {
            self.reply_error(conn, &AppError::NotFound(format!(
                "session {} not found",
                conn.session_id
            )));
            return;
        };

        if let Err(reject) = session.begin_update(&device_id, conn.id, expected_version) {
            match reject {
                UpdateReject::NotHolder { holder_username } => {
                    self.broadcaster.send_to(
                        conn.id,
                        ServerMessage::DeviceLockFailed {
                            device_id,
                            reason: REASON_NOT_HOLDER.into(),
                            locked_by_username: holder_username,
                        },
                    );
                }
                UpdateReject::VersionMismatch { current } => {
                    self.reply_error(
                        conn,
                        &AppError::Conflict {
                            expected: expected_version,
                            current,
                        },
                    );
                }
            }
            return;
        }

        match self.scans.get_device(&session.scan_id, &device_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.reply_error(
                    conn,
                    &AppError::NotFound(format!("device {} not found", device_id)),
                );
                return;
            }
            Err(err) => {
                tracing::warn!(
                    scan_id = %session.scan_id,
                    device_id = %device_id,
                    error = %err,
                    "Device lookup failed"
                );
                self.reply_error(conn, &err);
                return;
            }
        }

        match self
            .scans
            .update_device(&session.scan_id, &device_id, &changes, expected_version)
            .await
        {
            Ok(DeviceUpdateOutcome::Applied { new_version }) => {
                let version = session.commit_update(new_version);
                self.broadcaster.broadcast_to_session(
                    &session,
                    ServerMessage::DeviceUpdated {
                        device_id,
                        changes,
                        username: conn.user.username.clone(),
                        version,
                    },
                    None,
                );
            }
            Ok(DeviceUpdateOutcome::VersionConflict { current_version }) => {
                // Storage is authoritative; resync so the client's next
                // retry against the refreshed version can succeed.
                session.resync_version(current_version);
                self.reply_error(
                    conn,
                    &AppError::Conflict {
                        expected: expected_version,
                        current: current_version,
                    },
                );
            }
            Err(err) => {
                tracing::error!(
                    scan_id = %session.scan_id,
                    device_id = %device_id,
                    error = %err,
                    "Device update failed"
                );
                self.reply_error(conn, &err);
            }
        }
    }

    fn broadcast_unlocked(&self, session: &ScanSession, device_id: String) {
        self.broadcaster.broadcast_to_session(
            session,
            ServerMessage::DeviceUnlocked { device_id },
            None,
        );
    }

    fn reply_error(&self, conn: &Connection, err: &AppError) {
        self.broadcaster
            .send_to(conn.id, ServerMessage::from_error(err));
    }

    fn member_of(conn: &Connection) -> SessionMember {
        SessionMember {
            connection_id: conn.id,
            user_id: conn.user.id.clone(),
            username: conn.user.username.clone(),
        }
    }
}
