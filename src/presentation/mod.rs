//! # Presentation Layer
//!
//! The transport-facing surface: HTTP routes, middleware, and the
//! WebSocket collaboration endpoint.

pub mod http;
pub mod middleware;
pub mod websocket;
