//! Scan Repository Implementation
//!
//! PostgreSQL implementation of the ScanRepository trait. Devices are
//! stored as a JSONB map keyed by device id on the `scans` row; the
//! conditional update is a single version-gated UPDATE so concurrent
//! writers cannot both succeed.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{Device, DeviceUpdateOutcome, ScanMeta, ScanRepository};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct ScanMetaRow {
    id: String,
    owner_id: String,
    version: i64,
}

impl ScanMetaRow {
    fn into_meta(self) -> ScanMeta {
        ScanMeta {
            id: self.id,
            owner_id: self.owner_id,
            version: self.version.max(0) as u64,
        }
    }
}

/// PostgreSQL scan repository implementation.
#[derive(Clone)]
pub struct PgScanRepository {
    pool: PgPool,
}

impl PgScanRepository {
    /// Create a new PgScanRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanRepository for PgScanRepository {
    /// Load scan metadata (owner, persisted version).
    async fn find_meta(&self, scan_id: &str) -> Result<Option<ScanMeta>, AppError> {
        let row = sqlx::query_as::<_, ScanMetaRow>(
            r#"
            SELECT id, owner_id, version
            FROM scans
            WHERE id = $1
            "#,
        )
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_meta()))
    }

    /// Load a single device payload out of the JSONB device map.
    async fn get_device(
        &self,
        scan_id: &str,
        device_id: &str,
    ) -> Result<Option<Device>, AppError> {
        let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
            r#"
            SELECT devices -> $2
            FROM scans
            WHERE id = $1
            "#,
        )
        .bind(scan_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Err(AppError::NotFound(format!("scan {} not found", scan_id))),
            Some((None,)) => Ok(None),
            Some((Some(data),)) => Ok(Some(Device::new(device_id, data))),
        }
    }

    /// Merge `changes` into the device payload, gated on the scan version.
    ///
    /// The WHERE clause carries the version check, so a stale writer
    /// matches zero rows instead of clobbering a newer write.
    async fn update_device(
        &self,
        scan_id: &str,
        device_id: &str,
        changes: &serde_json::Value,
        expected_version: u64,
    ) -> Result<DeviceUpdateOutcome, AppError> {
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE scans
            SET devices = jsonb_set(
                    devices,
                    ARRAY[$2],
                    COALESCE(devices -> $2, '{}'::jsonb) || $3
                ),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $4
            RETURNING version
            "#,
        )
        .bind(scan_id)
        .bind(device_id)
        .bind(changes)
        .bind(expected_version as i64)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((new_version,)) = updated {
            return Ok(DeviceUpdateOutcome::Applied {
                new_version: new_version.max(0) as u64,
            });
        }

        // Zero rows matched: either the scan is gone or the version moved.
        let current: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT version
            FROM scans
            WHERE id = $1
            "#,
        )
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await?;

        match current {
            Some((version,)) => Ok(DeviceUpdateOutcome::VersionConflict {
                current_version: version.max(0) as u64,
            }),
            None => Err(AppError::NotFound(format!("scan {} not found", scan_id))),
        }
    }
}
