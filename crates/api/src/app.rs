use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use persistence::repositories::{CallbackRequestRepository, SearchQueryRepository};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_admin,
    security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{callbacks, chat, contact, health, site};
use crate::services::email::EmailError;
use crate::services::llm::LlmError;
use crate::services::search::{BraveSearchClient, SearchError};
use crate::services::webpage::{FetchError, WebpageFetcher};
use crate::services::{ChatService, EmailService, LeadMailer, OpenRouterClient, ToolExecutor};

/// A service client that could not be built at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("email client: {0}")]
    Email(#[from] EmailError),

    #[error("chat client: {0}")]
    Llm(#[from] LlmError),

    #[error("search client: {0}")]
    Search(#[from] SearchError),

    #[error("webpage fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
    pub mailer: LeadMailer,
    pub chat: ChatService,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the production service clients from configuration.
    pub fn new(config: Config, pool: PgPool) -> Result<Self, StartupError> {
        let config = Arc::new(config);

        let email = EmailService::new(config.email.clone())?;
        let mailer = LeadMailer::new(email, config.site.url.clone());

        let tools = ToolExecutor::new(
            Arc::new(config.tools.clone()),
            SearchQueryRepository::new(pool.clone()),
            CallbackRequestRepository::new(pool.clone()),
            BraveSearchClient::new(&config.tools)?,
            WebpageFetcher::new(&config.tools)?,
            mailer.clone(),
        );
        let llm = OpenRouterClient::new(&config.chat, &config.site)?;
        let chat = ChatService::new(
            Arc::new(config.chat.clone()),
            Arc::new(llm),
            Arc::new(tools),
        );

        Ok(Self::with_services(config, pool, mailer, chat))
    }

    /// Assembles state around already-built services.
    pub fn with_services(
        config: Arc<Config>,
        pool: PgPool,
        mailer: LeadMailer,
        chat: ChatService,
    ) -> Self {
        let rate_limiter =
            RateLimiterState::new(config.security.rate_limit_per_minute).map(Arc::new);

        Self {
            pool,
            config,
            rate_limiter,
            mailer,
            chat,
            started_at: Instant::now(),
        }
    }
}

pub fn create_app(config: Config, pool: PgPool) -> Result<Router, StartupError> {
    Ok(build_router(AppState::new(config, pool)?))
}

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Permissive unless origins are configured
    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Public form and chat endpoints, limited per client IP
    let public_posts = Router::new()
        .route("/api/send-email", post(contact::send_email))
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/email-transcript", post(chat::email_transcript))
        .route("/api/admin/login", post(callbacks::admin_login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    // Dashboard API (x-admin-password)
    let admin_routes = Router::new()
        .route("/api/callbacks", get(callbacks::list_callbacks))
        .route(
            "/api/callbacks/:id",
            get(callbacks::get_callback).patch(callbacks::update_callback_status),
        )
        .route("/api/callbacks-stats", get(callbacks::callback_stats))
        .route("/api/test-schema", get(callbacks::test_schema))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::ready))
        .route("/api/chat/config", get(chat::chat_config))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(public_posts)
        .merge(admin_routes)
        .merge(site::public_files(&config.server.public_dir))
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn_with_state(
            config.security.hsts_enabled,
            security_headers_middleware,
        ))
        // The default predicate already skips text/event-stream
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
