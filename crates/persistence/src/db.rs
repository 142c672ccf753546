//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Creates a PostgreSQL connection pool with the given configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
}

/// Round-trips a trivial query, used by the readiness probe.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Splits a Postgres URL into the database name and the same URL pointed
/// at the `postgres` maintenance database. Query strings are preserved.
pub fn maintenance_url(url: &str, default_name: &str) -> (String, String) {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };

    let authority_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let (server, name) = match base[authority_end..].rfind('/') {
        Some(slash) => {
            let slash = authority_end + slash;
            (&base[..slash], &base[slash + 1..])
        }
        None => (base, ""),
    };

    let name = if name.is_empty() { default_name } else { name };
    let mut maintenance = format!("{}/postgres", server);
    if let Some(query) = query {
        maintenance.push('?');
        maintenance.push_str(query);
    }
    (name.to_string(), maintenance)
}
