//! Device Lock Management
//!
//! Single-writer-at-a-time semantics per device within a session. A lock
//! is transient, in-memory state: it is created by `device_lock`, and
//! destroyed by explicit unlock, holder disconnect, or session teardown.
//! There is no queueing; a refused acquire is reported immediately and the
//! client re-requests after observing `device_unlocked`.

use chrono::{DateTime, Utc};

use super::registry::ConnectionId;
use super::session::{ScanSession, SessionMember};

/// An outstanding edit lock on one device.
#[derive(Debug, Clone)]
pub struct DeviceLock {
    pub holder_connection_id: ConnectionId,
    pub holder_user_id: String,
    pub holder_username: String,
    pub acquired_at: DateTime<Utc>,
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone)]
pub enum LockAcquire {
    /// The requester now holds the lock
    Granted,
    /// Someone already holds it; identity reported for the failure reply
    Held {
        holder_user_id: String,
        holder_username: String,
    },
}

/// Result of a lock release attempt.
#[derive(Debug, Clone)]
pub enum LockRelease {
    Released,
    /// Nothing to release
    NotHeld,
    /// A different connection holds the lock and no override was applied
    NotHolder { holder_username: String },
}

impl ScanSession {
    /// Atomic check-and-set acquire. First-come-first-served: at most one
    /// of two concurrent requests for the same device can observe "no
    /// current holder".
    pub fn acquire_lock(&self, device_id: &str, requester: &SessionMember) -> LockAcquire {
        let mut state = self.state.lock();
        if let Some(existing) = state.locks.get(device_id) {
            return LockAcquire::Held {
                holder_user_id: existing.holder_user_id.clone(),
                holder_username: existing.holder_username.clone(),
            };
        }
        state.locks.insert(
            device_id.to_string(),
            DeviceLock {
                holder_connection_id: requester.connection_id,
                holder_user_id: requester.user_id.clone(),
                holder_username: requester.username.clone(),
                acquired_at: Utc::now(),
            },
        );
        LockAcquire::Granted
    }

    /// Release a lock. Only the holder may release it unless `force` is
    /// set (owner override, authorized upstream).
    pub fn release_lock(
        &self,
        device_id: &str,
        connection_id: ConnectionId,
        force: bool,
    ) -> LockRelease {
        let mut state = self.state.lock();
        match state.locks.get(device_id) {
            None => LockRelease::NotHeld,
            Some(lock) if lock.holder_connection_id == connection_id || force => {
                state.locks.remove(device_id);
                LockRelease::Released
            }
            Some(lock) => LockRelease::NotHolder {
                holder_username: lock.holder_username.clone(),
            },
        }
    }

    /// Current holder's username for a device, if locked.
    pub fn lock_holder(&self, device_id: &str) -> Option<String> {
        self.state
            .lock()
            .locks
            .get(device_id)
            .map(|lock| lock.holder_username.clone())
    }
}
