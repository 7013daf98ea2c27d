//! Heartbeat Monitor
//!
//! Application-level liveness probing. Intermediary proxies and browser
//! transports are not trusted to propagate native ping/pong control
//! frames, so the server sends `server_ping` messages and expects
//! `server_pong` replies. A connection that misses two consecutive probe
//! intervals is evicted through the ordinary disconnect path, which
//! releases its locks and broadcasts its departure.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::hub::CollaborationHub;
use super::messages::{close_codes, ServerMessage};

/// Consecutive missed probe intervals before a connection is declared dead.
pub const MAX_MISSED_PROBES: u32 = 2;

/// Spawn the monitor. `interval` must stay below any proxy idle timeout
/// in front of the server.
pub fn spawn(hub: Arc<CollaborationHub>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(run(hub, interval))
}

async fn run(hub: Arc<CollaborationHub>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Heartbeat monitor started");
    loop {
        // Each tick schedules the next from its own start time; a stalled
        // process resumes with a single late tick instead of a burst.
        let next = Instant::now() + interval;
        sweep(&hub);
        sleep_until(next).await;
    }
}

/// Probe every live connection once, evicting the dead.
pub fn sweep(hub: &CollaborationHub) {
    for conn in hub.registry().snapshot() {
        if conn.register_probe(MAX_MISSED_PROBES) {
            tracing::info!(
                connection_id = %conn.id,
                user_id = %conn.user.id,
                scan_id = %conn.session_id,
                idle_secs = conn.seconds_since_pong(),
                "Heartbeat timeout, evicting connection"
            );
            conn.close(close_codes::HEARTBEAT_TIMEOUT);
            hub.disconnect(conn.id);
        } else {
            conn.send(ServerMessage::server_ping_now());
        }
    }
}
