//! Configuration management.

mod settings;

pub use settings::{
    CollabSettings, CorsSettings, DatabaseSettings, JwtSettings, ServerSettings, Settings,
    MIN_JWT_SECRET_LENGTH,
};
