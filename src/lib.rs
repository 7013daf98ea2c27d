//! # Scan Collab Server
//!
//! Real-time collaboration server for a network-scanning dashboard.
//! Multiple users view and edit a shared scan document concurrently; the
//! server enforces per-device edit locks, versions every accepted device
//! mutation, and keeps all connected clients consistent through
//! broadcasts and server-driven heartbeats.
//!
//! ## Architecture
//!
//! The crate follows a layered architecture:
//!
//! - **Domain Layer**: scan/device entities, repository traits, lock
//!   authorization policy
//! - **Application Layer**: credential verification
//! - **Infrastructure Layer**: PostgreSQL repository implementations
//! - **Presentation Layer**: HTTP routes and the WebSocket collaboration
//!   endpoint
//!
//! ## Module Structure
//!
//! ```text
//! scan_collab/
//! +-- config/        Configuration management
//! +-- domain/        Entities, repository traits, authorization policy
//! +-- application/   Token verification
//! +-- infrastructure/ Database pool and repositories
//! +-- presentation/  HTTP routes and the collaboration WebSocket
//! +-- shared/        Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Services between transport and domain
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
