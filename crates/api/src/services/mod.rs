//! External service integrations and the chat orchestration built on them.

pub mod chat;
pub mod email;
pub mod lead_emails;
pub mod llm;
pub mod search;
pub mod tools;
pub mod webpage;

pub use chat::ChatService;
pub use email::EmailService;
pub use lead_emails::LeadMailer;
pub use llm::{ChatCompletionApi, OpenRouterClient};
pub use tools::{ToolExecutor, ToolRunner};
