//! User identity entity.

use serde::{Deserialize, Serialize};

/// Identity of an authenticated collaborator.
///
/// Produced by the token verifier; the collaboration server never stores
/// or mutates user records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user id (the token's subject)
    pub id: String,

    /// Display name shown in presence lists and lock badges
    pub username: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}
