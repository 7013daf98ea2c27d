//! Application Error Types
//!
//! Centralized error handling with Axum integration and the wire-level
//! error codes used by the collaboration protocol.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad/expired/missing credential. Fatal to a collaboration
    /// connection: the transport is closed with the auth close code.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requester is not permitted to perform the operation (e.g. not the
    /// lock holder). Reported to the requester; the connection stays open.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Optimistic-concurrency version mismatch on a device update.
    #[error("Version conflict: expected {expected}, current {current}")]
    Conflict { expected: u64, current: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Malformed or unknown protocol message. Reported to the requester;
    /// the connection stays open.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Machine-readable code carried in the `error` wire message.
    pub fn wire_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "auth_failed",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict { .. } => "version_conflict",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Protocol(_) => "protocol_error",
            AppError::Internal(_) | AppError::Database(_) => "internal_error",
        }
    }

    /// Authoritative version attached to conflict replies so the client
    /// can refresh before retrying.
    pub fn current_version(&self) -> Option<u64> {
        match self {
            AppError::Conflict { current, .. } => Some(*current),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 20001, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 20002, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 20003, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, 20004, msg.clone()),
            AppError::Conflict { .. } => (StatusCode::CONFLICT, 20005, self.to_string()),
            AppError::Protocol(msg) => (StatusCode::BAD_REQUEST, 20006, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 20000, "Internal server error".into())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 20000, "Internal server error".into())
            }
        };

        let body = ErrorResponse { code, message };

        (status, Json(body)).into_response()
    }
}
