//! Real-time collaboration over WebSocket.
//!
//! One `CollaborationHub` owns all connection and session state; the
//! handler drives each connection's state machine, the heartbeat monitor
//! evicts dead peers, and the broadcaster fans events out to sessions.

pub mod broadcast;
pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod locks;
pub mod messages;
pub mod registry;
pub mod session;

pub use handler::ws_handler;
pub use hub::CollaborationHub;
