//! Domain layer for the Websited backend.
//!
//! This crate contains:
//! - Domain models (leads, contact submissions, chat and tool payloads)
//! - Stream decoding and tool-call accumulation for the chat proxy
//! - Page analysis and lead classification helpers

pub mod models;
pub mod services;
