use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use websited_api::app::{build_router, AppState};
use websited_api::config::Config;
use websited_api::error::expose_error_details;
use websited_api::middleware::{self, RateLimiterState};

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;
    expose_error_details(config.server.is_development());

    info!("Starting Websited server v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&(&config.database).into()).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    if !config.chat.is_available() {
        info!("chat.api_key not set, chat assistant disabled");
    }
    if !config.email.enabled {
        info!("Email delivery disabled, messages will only be logged");
    }

    let addr = config.socket_addr()?;
    let state = AppState::new(config, pool)?;

    if let Some(limiter) = state.rate_limiter.clone() {
        spawn_rate_limit_pruner(limiter);
    }

    let app = build_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn spawn_rate_limit_pruner(limiter: Arc<RateLimiterState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.prune();
            debug!(clients = limiter.tracked_clients(), "Pruned rate limiter");
        }
    });
}
