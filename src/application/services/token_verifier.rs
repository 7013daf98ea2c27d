//! Token Verification Service
//!
//! Validates bearer credentials presented on collaboration connections.
//! Token issuance lives in the dashboard's identity service; this server
//! only verifies signatures and extracts the collaborator identity.

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtSettings;
use crate::domain::UserIdentity;

/// Token verification trait for dependency injection
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Validate a bearer credential and extract the user identity
    async fn verify(&self, credential: &str) -> Result<UserIdentity, TokenError>;
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Display name embedded at issuance
    #[serde(default)]
    pub username: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Token verification errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Missing credential")]
    Missing,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,
}

/// JWT-backed verifier using the shared dashboard secret
pub struct JwtTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<UserIdentity, TokenError> {
        if credential.is_empty() {
            return Err(TokenError::Missing);
        }

        let token_data = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        let claims = token_data.claims;
        let username = claims.username.unwrap_or_else(|| claims.sub.clone());

        Ok(UserIdentity::new(claims.sub, username))
    }
}
