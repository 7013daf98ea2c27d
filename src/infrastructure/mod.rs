//! # Infrastructure Layer
//!
//! Concrete implementations of the domain's persistence contracts.

pub mod database;
pub mod repositories;
