//! HTTP route handlers.

pub mod callbacks;
pub mod chat;
pub mod contact;
pub mod health;
pub mod site;
