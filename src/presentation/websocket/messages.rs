//! Collaboration Wire Protocol
//!
//! Every frame is a JSON object tagged by `type`. Payload fields use
//! camelCase to match the dashboard client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// WebSocket close codes. Clients distinguish "do not retry with the same
/// credential" (4001) from "transient, retry with backoff" (4002).
pub mod close_codes {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Authentication failure; the credential is bad or expired
    pub const AUTH_FAILURE: u16 = 4001;
    /// Server-side eviction after sustained heartbeat failure
    pub const HEARTBEAT_TIMEOUT: u16 = 4002;
}

/// Messages the client sends to the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// In-band authentication, used when the credential was not supplied
    /// as a connection query parameter.
    Auth {
        credential: String,
        session_id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },

    /// Request the edit lock for one device
    DeviceLock { device_id: String },

    /// Release the edit lock for one device
    DeviceUnlock { device_id: String },

    /// Apply changes to a locked device, gated on the expected version
    DeviceUpdate {
        device_id: String,
        changes: serde_json::Value,
        version: u64,
    },

    /// Client-level heartbeat; answered with `pong` immediately
    Ping,

    /// Reply to a `server_ping` liveness probe
    ServerPong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Session snapshot delivered to a connection on join
    SessionData {
        users: Vec<SessionUser>,
        locks: Vec<SessionLock>,
        version: u64,
    },

    /// Presence: a user joined the session
    UserJoined { user_id: String, username: String },

    /// Presence: a user left the session
    UserLeft { user_id: String, username: String },

    /// A device lock was granted (broadcast to the whole session,
    /// including the requester)
    DeviceLocked {
        device_id: String,
        user_id: String,
        username: String,
    },

    /// A lock request was refused; sent to the requester only
    DeviceLockFailed {
        device_id: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        locked_by_username: Option<String>,
    },

    /// A device lock was released (broadcast to the whole session)
    DeviceUnlocked { device_id: String },

    /// A device update was accepted (broadcast to the whole session,
    /// including the requester)
    DeviceUpdated {
        device_id: String,
        changes: serde_json::Value,
        username: String,
        version: u64,
    },

    /// Reply to a client `ping`
    Pong,

    /// Server-driven liveness probe
    ServerPing { timestamp: i64 },

    /// Request-scoped error; the connection stays open
    Error {
        message: String,
        code: String,
        /// Authoritative version, present on version conflicts so the
        /// client can refresh before retrying
        #[serde(skip_serializing_if = "Option::is_none")]
        current_version: Option<u64>,
    },
}

impl ServerMessage {
    /// Build the wire error for an `AppError`. Internal failures are not
    /// described to the peer.
    pub fn from_error(err: &AppError) -> Self {
        let message = match err {
            AppError::Internal(_) | AppError::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ServerMessage::Error {
            message,
            code: err.wire_code().to_string(),
            current_version: err.current_version(),
        }
    }

    /// A liveness probe stamped with the current wall clock.
    pub fn server_ping_now() -> Self {
        ServerMessage::ServerPing {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Presence entry in a session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
}

/// Lock entry in a session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLock {
    pub device_id: String,
    pub user_id: String,
    pub username: String,
    pub acquired_at: DateTime<Utc>,
}
