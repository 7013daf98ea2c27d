//! Scan document entity and repository trait.
//!
//! The scan document itself (topology, device payloads) is owned by the
//! dashboard's CRUD layer; the collaboration server only reads metadata,
//! reads devices, and performs version-gated device writes through the
//! `ScanRepository` contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::entities::device::Device;
use crate::shared::error::AppError;

/// Metadata slice of a scan document.
///
/// Loaded on session creation to seed the session's version counter and to
/// resolve the scan owner for lock-override authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMeta {
    /// Scan document id (doubles as the collaboration session id)
    pub id: String,

    /// User id of the scan's owner
    pub owner_id: String,

    /// Persisted optimistic-concurrency version
    pub version: u64,
}

/// Outcome of a conditional device update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceUpdateOutcome {
    /// The write was applied; the scan now carries `new_version`.
    Applied { new_version: u64 },

    /// The expected version did not match; `current_version` is the
    /// authoritative version the client must refresh to.
    VersionConflict { current_version: u64 },
}

/// Repository trait for scan document access.
///
/// This is the persistence gateway consumed by the collaboration core.
/// The conditional `update_device` is the single optimistic-concurrency
/// point: it only applies when `expected_version` matches storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanRepository: Send + Sync {
    /// Load scan metadata (owner, persisted version).
    async fn find_meta(&self, scan_id: &str) -> Result<Option<ScanMeta>, AppError>;

    /// Load a single device from a scan.
    async fn get_device(&self, scan_id: &str, device_id: &str)
        -> Result<Option<Device>, AppError>;

    /// Merge `changes` into a device, gated on `expected_version`.
    ///
    /// Returns `VersionConflict` without writing when the stored version
    /// differs, and `AppError::NotFound` when the scan does not exist.
    async fn update_device(
        &self,
        scan_id: &str,
        device_id: &str,
        changes: &serde_json::Value,
        expected_version: u64,
    ) -> Result<DeviceUpdateOutcome, AppError>;
}
