//! Presence, session lifecycle, and heartbeat eviction scenarios.

use pretty_assertions::assert_eq;

use scan_collab::presentation::websocket::heartbeat;
use scan_collab::presentation::websocket::messages::{close_codes, ServerMessage};

use crate::common::{InMemoryScanRepository, TestHub};

fn scan_store() -> InMemoryScanRepository {
    InMemoryScanRepository::new().with_scan("scan-42", "id-a", 5, &["dev-1"])
}

#[tokio::test]
async fn join_snapshot_carries_members_locks_and_seeded_version() {
    let hub = TestHub::new(scan_store());
    let mut a = hub.join("id-a", "A", "scan-42").await;

    match a.recv() {
        ServerMessage::SessionData {
            users,
            locks,
            version,
        } => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].username, "A");
            assert!(locks.is_empty());
            assert_eq!(version, 5);
        }
        other => panic!("expected session_data, got {other:?}"),
    }

    // A locks, then B joins: B's snapshot must carry the lock
    hub.hub.handle_device_lock(&a.conn, "dev-1".into());
    let mut b = hub.join("id-b", "B", "scan-42").await;

    match b.recv() {
        ServerMessage::SessionData { users, locks, .. } => {
            assert_eq!(users.len(), 2);
            assert_eq!(locks.len(), 1);
            assert_eq!(locks[0].device_id, "dev-1");
            assert_eq!(locks[0].username, "A");
        }
        other => panic!("expected session_data, got {other:?}"),
    }

    // A was told about B, but not about itself joining
    let a_msgs = a.drain();
    assert!(a_msgs.contains(&ServerMessage::UserJoined {
        user_id: "id-b".into(),
        username: "B".into(),
    }));
}

#[tokio::test]
async fn departure_is_broadcast_to_remaining_members() {
    let hub = TestHub::new(scan_store());
    let a = hub.join("id-a", "A", "scan-42").await;
    let mut b = hub.join("id-b", "B", "scan-42").await;
    b.drain();

    hub.hub.disconnect(a.conn.id);

    assert_eq!(
        b.drain(),
        vec![ServerMessage::UserLeft {
            user_id: "id-a".into(),
            username: "A".into(),
        }]
    );
}

#[tokio::test]
async fn teardown_discards_locks_and_rejoin_starts_clean() {
    let hub = TestHub::new(scan_store());
    let a = hub.join("id-a", "A", "scan-42").await;
    hub.hub.handle_device_lock(&a.conn, "dev-1".into());

    hub.hub.disconnect(a.conn.id);
    assert!(hub.hub.session("scan-42").is_none());
    assert_eq!(hub.hub.session_count(), 0);
    assert_eq!(hub.hub.connection_count(), 0);

    // Rejoin: no stale locks, version still seeded from storage
    let mut again = hub.join("id-a", "A", "scan-42").await;
    match again.recv() {
        ServerMessage::SessionData { locks, version, .. } => {
            assert!(locks.is_empty());
            assert_eq!(version, 5);
        }
        other => panic!("expected session_data, got {other:?}"),
    }
}

#[tokio::test]
async fn heartbeat_eviction_releases_locks_and_notifies_survivors() {
    let hub = TestHub::new(scan_store());
    let mut a = hub.join("id-a", "A", "scan-42").await;
    let mut b = hub.join("id-b", "B", "scan-42").await;
    hub.hub.handle_device_lock(&a.conn, "dev-1".into());
    a.drain();
    b.drain();

    // Three sweeps with B answering every probe and A silent
    for _ in 0..3 {
        heartbeat::sweep(&hub.hub);
        b.conn.note_pong();
    }

    assert_eq!(hub.hub.connection_count(), 1);

    // A was closed with the heartbeat code, not the auth code
    assert_eq!(a.close_codes(), vec![close_codes::HEARTBEAT_TIMEOUT]);

    // B saw the lock release and the departure, in that order
    let survivors_view: Vec<ServerMessage> = b
        .drain()
        .into_iter()
        .filter(|msg| !matches!(msg, ServerMessage::ServerPing { .. }))
        .collect();
    assert_eq!(
        survivors_view,
        vec![
            ServerMessage::DeviceUnlocked {
                device_id: "dev-1".into(),
            },
            ServerMessage::UserLeft {
                user_id: "id-a".into(),
                username: "A".into(),
            },
        ]
    );

    // The transport-close path racing in afterwards is a no-op
    assert!(!hub.hub.disconnect(a.conn.id));
}

#[tokio::test]
async fn sessions_are_isolated_from_each_other() {
    let store = InMemoryScanRepository::new()
        .with_scan("scan-1", "id-a", 0, &["dev-1"])
        .with_scan("scan-2", "id-b", 0, &["dev-1"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-1").await;
    let mut b = hub.join("id-b", "B", "scan-2").await;
    a.drain();
    b.drain();

    // Same device id, different sessions: both locks succeed
    hub.hub.handle_device_lock(&a.conn, "dev-1".into());
    hub.hub.handle_device_lock(&b.conn, "dev-1".into());

    assert!(matches!(a.recv(), ServerMessage::DeviceLocked { .. }));
    assert!(matches!(b.recv(), ServerMessage::DeviceLocked { .. }));
    // Neither session observed the other's traffic
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
}
