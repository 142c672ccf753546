//! Repository implementations for database operations.

pub mod callback_request;
pub mod search_query;

pub use callback_request::CallbackRequestRepository;
pub use search_query::SearchQueryRepository;
