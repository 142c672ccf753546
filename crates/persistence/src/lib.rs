//! Persistence layer for the Websited backend.
//!
//! This crate contains:
//! - Database connection management
//! - SQL migrations (applied at startup)
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - Query timing metrics

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
