//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod callback_request;
pub mod search_query;

pub use callback_request::{CallbackRequestEntity, ColumnInfoEntity, LeadStatsEntity};
pub use search_query::{SearchQueryEntity, WEBPAGE_QUERY_PREFIX};
