//! # Domain Layer
//!
//! Core business types of the collaboration server, independent of any
//! transport or storage framework.
//!
//! - **entities**: scan metadata, devices, user identities, and the
//!   `ScanRepository` persistence contract
//! - **services**: lock-override authorization policy

pub mod entities;
pub mod services;

pub use entities::*;
pub use services::{DenyOverride, LockAuthorizer, ScanOwnerAuthorizer};
