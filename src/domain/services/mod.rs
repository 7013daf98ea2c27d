//! Domain services for business rules that span entities.

pub mod authorization;

pub use authorization::{DenyOverride, LockAuthorizer, ScanOwnerAuthorizer};
