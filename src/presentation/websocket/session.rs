//! Scan Session State
//!
//! One `ScanSession` exists per scan document under collaborative view,
//! created lazily on first join and discarded when the last member leaves.
//! The interior mutex is the session's single serialization point: every
//! mutation of members, locks, or version goes through it, and it is never
//! held across an await.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::locks::DeviceLock;
use super::messages::{SessionLock, SessionUser};
use super::registry::ConnectionId;

/// Denormalized member entry for presence display.
#[derive(Debug, Clone)]
pub struct SessionMember {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub username: String,
}

/// Snapshot of a session, sent to a connection on join.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub users: Vec<SessionUser>,
    pub locks: Vec<SessionLock>,
    pub version: u64,
}

/// Why an update request was refused before reaching persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReject {
    /// Requester does not hold the device lock. Checked before the
    /// version so a stale non-holder is reported as unauthorized, not
    /// as a conflict.
    NotHolder { holder_username: Option<String> },

    /// Expected version is stale; `current` is authoritative.
    VersionMismatch { current: u64 },
}

#[derive(Debug)]
pub(super) struct SessionState {
    pub(super) members: HashMap<ConnectionId, SessionMember>,
    pub(super) locks: HashMap<String, DeviceLock>,
    pub(super) version: u64,
    /// Set when the last member leaves; a closed session admits nobody
    /// and is about to be removed from the hub's map.
    pub(super) closed: bool,
}

impl SessionState {
    /// Release every lock held by `connection_id`, returning the device
    /// ids in a stable order for broadcasting.
    pub(super) fn release_locks_held_by(&mut self, connection_id: ConnectionId) -> Vec<String> {
        let mut released: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.holder_connection_id == connection_id)
            .map(|(device_id, _)| device_id.clone())
            .collect();
        released.sort();
        for device_id in &released {
            self.locks.remove(device_id);
        }
        released
    }
}

/// Membership change produced by a leave.
#[derive(Debug)]
pub struct LeaveOutcome {
    pub member: SessionMember,
    /// Locks released as a side effect, one `device_unlocked` broadcast each
    pub released_devices: Vec<String>,
    pub now_empty: bool,
}

/// A collaboration session for one scan document.
pub struct ScanSession {
    pub scan_id: String,
    pub(super) state: Mutex<SessionState>,
}

impl ScanSession {
    /// Create a session seeded with the scan's persisted version.
    pub fn new(scan_id: impl Into<String>, initial_version: u64) -> Self {
        Self {
            scan_id: scan_id.into(),
            state: Mutex::new(SessionState {
                members: HashMap::new(),
                locks: HashMap::new(),
                version: initial_version,
                closed: false,
            }),
        }
    }

    /// Add a member and return the post-join snapshot. Returns `None`
    /// when the session has already been closed by a concurrent teardown;
    /// the caller must create a fresh session and retry.
    pub(super) fn try_join(&self, member: SessionMember) -> Option<SessionSnapshot> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.members.insert(member.connection_id, member);
        Some(Self::snapshot_locked(&state))
    }

    /// Remove a member, cascading to its locks. Returns `None` when the
    /// connection was not a member (double-leave is a no-op).
    pub fn leave(&self, connection_id: ConnectionId) -> Option<LeaveOutcome> {
        let mut state = self.state.lock();
        let member = state.members.remove(&connection_id)?;
        let released_devices = state.release_locks_held_by(connection_id);
        let now_empty = state.members.is_empty();
        if now_empty {
            state.closed = true;
        }
        Some(LeaveOutcome {
            member,
            released_devices,
            now_empty,
        })
    }

    /// Current members + locks + version.
    pub fn snapshot(&self) -> SessionSnapshot {
        Self::snapshot_locked(&self.state.lock())
    }

    fn snapshot_locked(state: &SessionState) -> SessionSnapshot {
        let mut users: Vec<SessionUser> = state
            .members
            .values()
            .map(|m| SessionUser {
                user_id: m.user_id.clone(),
                username: m.username.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let mut locks: Vec<SessionLock> = state
            .locks
            .iter()
            .map(|(device_id, lock)| SessionLock {
                device_id: device_id.clone(),
                user_id: lock.holder_user_id.clone(),
                username: lock.holder_username.clone(),
                acquired_at: lock.acquired_at,
            })
            .collect();
        locks.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        SessionSnapshot {
            users,
            locks,
            version: state.version,
        }
    }

    /// Connection ids of all current members, for broadcast fan-out.
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.state.lock().members.keys().copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Closed sessions are removed from the hub map; this guards the
    /// remove against a concurrent re-join.
    pub(super) fn is_defunct(&self) -> bool {
        self.state.lock().closed
    }

    /// Synchronous admission check for a device update: lock holdership
    /// first, then version. Runs entirely under the session mutex; the
    /// persistence call happens after it returns.
    pub fn begin_update(
        &self,
        device_id: &str,
        connection_id: ConnectionId,
        expected_version: u64,
    ) -> Result<(), UpdateReject> {
        let state = self.state.lock();
        match state.locks.get(device_id) {
            Some(lock) if lock.holder_connection_id == connection_id => {}
            Some(lock) => {
                return Err(UpdateReject::NotHolder {
                    holder_username: Some(lock.holder_username.clone()),
                })
            }
            None => return Err(UpdateReject::NotHolder { holder_username: None }),
        }
        if expected_version != state.version {
            return Err(UpdateReject::VersionMismatch {
                current: state.version,
            });
        }
        Ok(())
    }

    /// Record an accepted update's version after the persistence call.
    /// Concurrent commits may land out of order, so the counter only
    /// moves forward.
    pub fn commit_update(&self, new_version: u64) -> u64 {
        let mut state = self.state.lock();
        state.version = state.version.max(new_version);
        state.version
    }

    /// Raise the counter to the authoritative storage version reported by
    /// a conflict, so the next client retry can succeed.
    pub fn resync_version(&self, authoritative: u64) {
        let mut state = self.state.lock();
        state.version = state.version.max(authoritative);
    }
}
