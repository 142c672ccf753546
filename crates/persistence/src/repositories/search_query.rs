//! Search query log repository.
//!
//! Every Brave search and every webpage fetch issued by the chat tools is
//! logged here; the counts back the per-session limits and the monthly quota.

use sqlx::PgPool;

use crate::entities::{SearchQueryEntity, WEBPAGE_QUERY_PREFIX};
use crate::metrics::QueryTimer;

/// Repository for `search_queries`.
#[derive(Clone)]
pub struct SearchQueryRepository {
    pool: PgPool,
}

impl SearchQueryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Web searches already made in a chat session. `webpage:` rows are
    /// left out: fetches have their own session limit and never reach Brave.
    pub async fn count_searches_for_session(&self, session_id: &str) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_searches_for_session");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM search_queries
            WHERE session_id = $1 AND query NOT LIKE $2
            "#,
        )
        .bind(session_id)
        .bind(format!("{}%", WEBPAGE_QUERY_PREFIX))
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Webpage fetches already made in a chat session.
    pub async fn count_fetches_for_session(&self, session_id: &str) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_fetches_for_session");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM search_queries
            WHERE session_id = $1 AND query LIKE $2
            "#,
        )
        .bind(session_id)
        .bind(format!("{}%", WEBPAGE_QUERY_PREFIX))
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Web searches since the start of the current calendar month. Only
    /// these spend the Brave quota, so `webpage:` rows are left out.
    pub async fn count_searches_this_month(&self) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_searches_this_month");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM search_queries
            WHERE created_at >= date_trunc('month', CURRENT_TIMESTAMP)
              AND query NOT LIKE $1
            "#,
        )
        .bind(format!("{}%", WEBPAGE_QUERY_PREFIX))
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn log_search(
        &self,
        query: &str,
        session_id: &str,
        results_count: i32,
    ) -> Result<SearchQueryEntity, sqlx::Error> {
        self.insert("log_search", query.to_string(), session_id, results_count)
            .await
    }

    pub async fn log_webpage_fetch(
        &self,
        url: &str,
        session_id: &str,
    ) -> Result<SearchQueryEntity, sqlx::Error> {
        self.insert(
            "log_webpage_fetch",
            format!("{}{}", WEBPAGE_QUERY_PREFIX, url),
            session_id,
            1,
        )
        .await
    }

    async fn insert(
        &self,
        query_name: &'static str,
        query: String,
        session_id: &str,
        results_count: i32,
    ) -> Result<SearchQueryEntity, sqlx::Error> {
        let timer = QueryTimer::new(query_name);
        let result = sqlx::query_as::<_, SearchQueryEntity>(
            r#"
            INSERT INTO search_queries (query, session_id, results_count)
            VALUES ($1, $2, $3)
            RETURNING id, query, session_id, results_count, created_at
            "#,
        )
        .bind(query)
        .bind(session_id)
        .bind(results_count)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}
