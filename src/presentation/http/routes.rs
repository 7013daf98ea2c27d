//! Route Configuration
//!
//! The HTTP surface is intentionally small: the collaboration WebSocket
//! endpoint plus health probes. The dashboard's CRUD API lives in a
//! separate service.

use axum::{routing::get, Router};

use super::handlers;
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Collaboration endpoint; session id and credential arrive as
        // query parameters or as the first in-band auth message
        .route("/collab", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .with_state(state)
}
