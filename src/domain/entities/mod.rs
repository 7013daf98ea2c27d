//! Core domain entities.

pub mod device;
pub mod scan;
pub mod user;

pub use device::Device;
pub use scan::{DeviceUpdateOutcome, ScanMeta, ScanRepository};
pub use user::UserIdentity;
