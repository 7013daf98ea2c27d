//! Repository implementations backed by PostgreSQL.

pub mod scan_repository;

pub use scan_repository::PgScanRepository;
