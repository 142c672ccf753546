//! Domain models for the Websited backend.

pub mod chat;
pub mod contact;
pub mod lead;
pub mod tools;

pub use chat::{ChatMessage, ChatRequest, HistoryEntry, StreamNotice, ToolCall, ToolName};
pub use contact::{ContactFormError, ContactFormRequest, ContactSubmission};
pub use lead::{Lead, LeadSource, LeadStats, LeadStatus, ListLeadsQuery, NewLead, ReferenceKind};
pub use tools::{CallbackOutcome, SearchOutcome, WebpageOutcome};
