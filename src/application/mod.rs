//! # Application Layer
//!
//! Services that sit between the transport and the domain.

pub mod services;

pub use services::{JwtTokenVerifier, TokenError, TokenVerifier};
