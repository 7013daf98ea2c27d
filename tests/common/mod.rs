//! Common Test Utilities
//!
//! A collaboration hub harness with in-memory collaborators: a fake scan
//! store standing in for the persistence gateway, and test clients wired
//! straight to the hub through outbound channels (no sockets).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use scan_collab::domain::{
    DenyOverride, Device, DeviceUpdateOutcome, LockAuthorizer, ScanMeta, ScanOwnerAuthorizer,
    ScanRepository, UserIdentity,
};
use scan_collab::presentation::websocket::messages::ServerMessage;
use scan_collab::presentation::websocket::registry::{Connection, Outbound};
use scan_collab::presentation::websocket::CollaborationHub;
use scan_collab::shared::error::AppError;

/// One stored scan document.
#[derive(Debug, Clone)]
pub struct StoredScan {
    pub owner_id: String,
    pub version: u64,
    pub devices: HashMap<String, serde_json::Value>,
}

/// In-memory stand-in for the persistence gateway.
#[derive(Default)]
pub struct InMemoryScanRepository {
    scans: Mutex<HashMap<String, StoredScan>>,
    update_calls: AtomicUsize,
}

impl InMemoryScanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a scan with an owner, a version, and a set of device ids.
    pub fn with_scan(self, scan_id: &str, owner_id: &str, version: u64, devices: &[&str]) -> Self {
        self.scans.lock().insert(
            scan_id.to_string(),
            StoredScan {
                owner_id: owner_id.to_string(),
                version,
                devices: devices
                    .iter()
                    .map(|id| (id.to_string(), serde_json::json!({})))
                    .collect(),
            },
        );
        self
    }

    /// How many times the conditional update was attempted.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn stored_version(&self, scan_id: &str) -> Option<u64> {
        self.scans.lock().get(scan_id).map(|s| s.version)
    }

    /// Stored device payload, for asserting merge results.
    pub fn device_json(&self, scan_id: &str, device_id: &str) -> Option<serde_json::Value> {
        self.scans
            .lock()
            .get(scan_id)
            .and_then(|s| s.devices.get(device_id).cloned())
    }
}

#[async_trait]
impl ScanRepository for InMemoryScanRepository {
    async fn find_meta(&self, scan_id: &str) -> Result<Option<ScanMeta>, AppError> {
        Ok(self.scans.lock().get(scan_id).map(|scan| ScanMeta {
            id: scan_id.to_string(),
            owner_id: scan.owner_id.clone(),
            version: scan.version,
        }))
    }

    async fn get_device(
        &self,
        scan_id: &str,
        device_id: &str,
    ) -> Result<Option<Device>, AppError> {
        let scans = self.scans.lock();
        let scan = scans
            .get(scan_id)
            .ok_or_else(|| AppError::NotFound(format!("scan {} not found", scan_id)))?;
        Ok(scan
            .devices
            .get(device_id)
            .map(|data| Device::new(device_id, data.clone())))
    }

    async fn update_device(
        &self,
        scan_id: &str,
        device_id: &str,
        changes: &serde_json::Value,
        expected_version: u64,
    ) -> Result<DeviceUpdateOutcome, AppError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut scans = self.scans.lock();
        let scan = scans
            .get_mut(scan_id)
            .ok_or_else(|| AppError::NotFound(format!("scan {} not found", scan_id)))?;
        if scan.version != expected_version {
            return Ok(DeviceUpdateOutcome::VersionConflict {
                current_version: scan.version,
            });
        }
        let entry = scan
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| serde_json::json!({}));
        if let (Some(target), Some(incoming)) = (entry.as_object_mut(), changes.as_object()) {
            for (key, value) in incoming {
                target.insert(key.clone(), value.clone());
            }
        }
        scan.version += 1;
        Ok(DeviceUpdateOutcome::Applied {
            new_version: scan.version,
        })
    }
}

/// A test client attached directly to the hub.
pub struct TestClient {
    pub conn: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl TestClient {
    /// Next protocol frame; panics when the queue is empty.
    pub fn recv(&mut self) -> ServerMessage {
        match self.rx.try_recv() {
            Ok(Outbound::Frame(msg)) => msg,
            Ok(Outbound::Close(code)) => panic!("expected frame, got close({code})"),
            Err(_) => panic!("no message queued for {}", self.conn.user.username),
        }
    }

    /// All queued protocol frames.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let Outbound::Frame(msg) = msg {
                out.push(msg);
            }
        }
        out
    }

    /// Close codes queued for this client.
    pub fn close_codes(&mut self) -> Vec<u16> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let Outbound::Close(code) = msg {
                out.push(code);
            }
        }
        out
    }
}

/// Hub harness over in-memory collaborators.
pub struct TestHub {
    pub hub: Arc<CollaborationHub>,
    pub scans: Arc<InMemoryScanRepository>,
}

impl TestHub {
    /// Hub with owner-override authorization backed by the scan store.
    pub fn new(scans: InMemoryScanRepository) -> Self {
        let scans = Arc::new(scans);
        let authorizer = Arc::new(ScanOwnerAuthorizer::new(scans.clone()));
        Self {
            hub: Arc::new(CollaborationHub::new(scans.clone(), authorizer)),
            scans,
        }
    }

    /// Hub with strict holder-only unlock semantics.
    pub fn without_override(scans: InMemoryScanRepository) -> Self {
        let scans = Arc::new(scans);
        let authorizer: Arc<dyn LockAuthorizer> = Arc::new(DenyOverride);
        Self {
            hub: Arc::new(CollaborationHub::new(scans.clone(), authorizer)),
            scans,
        }
    }

    /// Join a client; the session-data snapshot stays queued on the
    /// client, mirroring what the dispatcher sends on the wire.
    pub async fn join(&self, user_id: &str, username: &str, scan_id: &str) -> TestClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let (conn, snapshot) = self
            .hub
            .join(UserIdentity::new(user_id, username), scan_id, tx)
            .await;
        conn.send(ServerMessage::SessionData {
            users: snapshot.users,
            locks: snapshot.locks,
            version: snapshot.version,
        });
        TestClient { conn, rx }
    }
}
