//! Device update and versioning scenarios.

use pretty_assertions::assert_eq;
use serde_json::json;

use scan_collab::presentation::websocket::messages::ServerMessage;

use crate::common::{InMemoryScanRepository, TestHub};

#[tokio::test]
async fn update_without_lock_never_reaches_the_gateway() {
    let store = InMemoryScanRepository::new().with_scan("scan-42", "id-a", 0, &["dev-1"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-42").await;
    a.drain();

    hub.hub
        .handle_device_update(&a.conn, "dev-1".into(), json!({"name": "x"}), 0)
        .await;

    assert_eq!(
        a.recv(),
        ServerMessage::DeviceLockFailed {
            device_id: "dev-1".into(),
            reason: "not_lock_holder".into(),
            locked_by_username: None,
        }
    );
    assert_eq!(hub.scans.update_calls(), 0);
    assert_eq!(hub.scans.stored_version("scan-42"), Some(0));
}

/// Lock-check precedes version-check: a client with a stale version that
/// never held the lock is rejected as unauthorized, not as a conflict.
#[tokio::test]
async fn stale_client_without_lock_gets_lock_error_not_conflict() {
    let store = InMemoryScanRepository::new().with_scan("scan-42", "id-a", 1, &["dev-2"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-42").await;
    let mut b = hub.join("id-b", "B", "scan-42").await;
    a.drain();
    b.drain();

    // A locks and updates dev-2; session version moves 1 -> 2
    hub.hub.handle_device_lock(&a.conn, "dev-2".into());
    hub.hub
        .handle_device_update(&a.conn, "dev-2".into(), json!({"name": "fw"}), 1)
        .await;
    a.drain();
    b.drain();

    // B still believes version 1 and never held the lock
    hub.hub
        .handle_device_update(&b.conn, "dev-2".into(), json!({"name": "old"}), 1)
        .await;

    match b.recv() {
        ServerMessage::DeviceLockFailed { reason, .. } => {
            assert_eq!(reason, "not_lock_holder");
        }
        other => panic!("expected lock failure, got {other:?}"),
    }
    // Only A's update hit storage
    assert_eq!(hub.scans.update_calls(), 1);
    assert_eq!(hub.scans.stored_version("scan-42"), Some(2));
}

#[tokio::test]
async fn stale_holder_receives_current_version() {
    let store = InMemoryScanRepository::new().with_scan("scan-42", "id-a", 3, &["dev-1"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-42").await;
    a.drain();

    hub.hub.handle_device_lock(&a.conn, "dev-1".into());
    a.drain();

    hub.hub
        .handle_device_update(&a.conn, "dev-1".into(), json!({"name": "x"}), 1)
        .await;

    match a.recv() {
        ServerMessage::Error {
            code,
            current_version,
            ..
        } => {
            assert_eq!(code, "version_conflict");
            assert_eq!(current_version, Some(3));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    // Rejected synchronously; storage never saw the write
    assert_eq!(hub.scans.update_calls(), 0);
}

#[tokio::test]
async fn versions_increment_by_one_per_accepted_update() {
    let store = InMemoryScanRepository::new().with_scan("scan-42", "id-a", 0, &["dev-1"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-42").await;
    a.drain();

    hub.hub.handle_device_lock(&a.conn, "dev-1".into());
    a.drain();

    for expected in 0..3 {
        hub.hub
            .handle_device_update(&a.conn, "dev-1".into(), json!({"step": expected}), expected)
            .await;
        match a.recv() {
            ServerMessage::DeviceUpdated { version, .. } => {
                assert_eq!(version, expected + 1);
            }
            other => panic!("expected update broadcast, got {other:?}"),
        }
    }

    assert_eq!(hub.scans.stored_version("scan-42"), Some(3));
    assert_eq!(hub.hub.session("scan-42").unwrap().version(), 3);
}

#[tokio::test]
async fn update_of_missing_device_reports_not_found() {
    let store = InMemoryScanRepository::new().with_scan("scan-42", "id-a", 0, &["dev-1"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-42").await;
    a.drain();

    hub.hub.handle_device_lock(&a.conn, "dev-9".into());
    a.drain();

    hub.hub
        .handle_device_update(&a.conn, "dev-9".into(), json!({"name": "x"}), 0)
        .await;

    match a.recv() {
        ServerMessage::Error { code, .. } => assert_eq!(code, "not_found"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(hub.scans.update_calls(), 0);
}

#[tokio::test]
async fn changes_are_merged_into_the_stored_device() {
    let store = InMemoryScanRepository::new().with_scan("scan-42", "id-a", 0, &["dev-1"]);
    let hub = TestHub::new(store);
    let mut a = hub.join("id-a", "A", "scan-42").await;
    a.drain();

    hub.hub.handle_device_lock(&a.conn, "dev-1".into());
    hub.hub
        .handle_device_update(&a.conn, "dev-1".into(), json!({"name": "Router-2"}), 0)
        .await;
    hub.hub
        .handle_device_update(&a.conn, "dev-1".into(), json!({"ip": "10.0.0.1"}), 1)
        .await;

    let device = hub
        .scans
        .device_json("scan-42", "dev-1")
        .expect("device present");
    assert_eq!(device["name"], "Router-2");
    assert_eq!(device["ip"], "10.0.0.1");
}
