//! Shared utilities and common types for the Websited backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Secret comparison and hashing helpers
//! - Offset pagination math
//! - Common validation logic
//! - Text helpers for building email bodies

pub mod crypto;
pub mod pagination;
pub mod text;
pub mod validation;
