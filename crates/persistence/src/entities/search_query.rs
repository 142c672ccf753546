//! Search query log entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Prefix marking webpage fetches in `search_queries.query`.
pub const WEBPAGE_QUERY_PREFIX: &str = "webpage:";

/// Database row of `search_queries`.
#[derive(Debug, Clone, FromRow)]
pub struct SearchQueryEntity {
    pub id: i32,
    /// Search text, or `webpage:<url>` for a fetch.
    pub query: String,
    pub session_id: String,
    pub results_count: i32,
    pub created_at: DateTime<Utc>,
}

impl SearchQueryEntity {
    pub fn is_webpage_fetch(&self) -> bool {
        self.query.starts_with(WEBPAGE_QUERY_PREFIX)
    }
}
