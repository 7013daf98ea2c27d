//! Application services.

pub mod token_verifier;

pub use token_verifier::{Claims, JwtTokenVerifier, TokenError, TokenVerifier};
