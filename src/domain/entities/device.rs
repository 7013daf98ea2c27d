//! Device entity.

use serde::{Deserialize, Serialize};

/// A device record inside a scan document.
///
/// The collaboration core gates write access to devices but treats their
/// content as an opaque JSON payload owned by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Device id, unique within its scan
    pub id: String,

    /// Opaque device payload (name, addresses, topology position, ...)
    pub data: serde_json::Value,
}

impl Device {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self { id: id.into(), data }
    }
}
