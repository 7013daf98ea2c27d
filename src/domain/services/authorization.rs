//! Lock-override authorization domain service.
//!
//! Decides whether a user who does not hold a device lock may still force
//! its release. The default policy grants the override to the scan owner
//! only; `DenyOverride` keeps strict holder-only semantics.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entities::ScanRepository;
use crate::shared::error::AppError;

/// Authorization hook consulted on `device_unlock` from a non-holder.
#[async_trait]
pub trait LockAuthorizer: Send + Sync {
    /// May `user_id` force-unlock devices in `scan_id`?
    async fn may_force_unlock(&self, scan_id: &str, user_id: &str) -> Result<bool, AppError>;
}

/// Grants the override to the scan's owner.
pub struct ScanOwnerAuthorizer<R: ScanRepository> {
    scans: Arc<R>,
}

impl<R: ScanRepository> ScanOwnerAuthorizer<R> {
    pub fn new(scans: Arc<R>) -> Self {
        Self { scans }
    }
}

#[async_trait]
impl<R: ScanRepository> LockAuthorizer for ScanOwnerAuthorizer<R> {
    async fn may_force_unlock(&self, scan_id: &str, user_id: &str) -> Result<bool, AppError> {
        let meta = self.scans.find_meta(scan_id).await?;
        Ok(meta.is_some_and(|m| m.owner_id == user_id))
    }
}

/// Denies every override; only the lock holder may unlock.
pub struct DenyOverride;

#[async_trait]
impl LockAuthorizer for DenyOverride {
    async fn may_force_unlock(&self, _scan_id: &str, _user_id: &str) -> Result<bool, AppError> {
        Ok(false)
    }
}
