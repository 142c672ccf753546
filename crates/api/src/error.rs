use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// When set, 5xx bodies carry the underlying cause in `details`.
static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Turns on `details` in 5xx responses. Called once at startup in the
/// development environment.
pub fn expose_error_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

pub const DATABASE_CONSTRAINT_MESSAGE: &str =
    "Database configuration error. Please contact support.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Logged and masked as a generic message.
    #[error("Internal error: {0}")]
    Internal(String),

    /// 500 whose `message` is safe to show; `details` is logged.
    #[error("{message}: {details}")]
    Server { message: String, details: String },

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn server(message: impl Into<String>, details: impl ToString) -> Self {
        ApiError::Server {
            message: message.into(),
            details: details.to_string(),
        }
    }

    /// Keeps the public message of a `Server` error, otherwise replaces the
    /// error with `message` and the original as details. Used where a route
    /// owns the user-facing wording of any database failure.
    pub fn or_server(self, message: &str) -> Self {
        match self {
            ApiError::Server { .. } => self,
            other => ApiError::server(message, other),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg, None),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", msg, None),
            ApiError::Internal(details) => {
                tracing::error!(error = %details, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                    Some(details),
                )
            }
            ApiError::Server { message, details } => {
                tracing::error!(error = %details, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    message,
                    Some(details),
                )
            }
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg, None),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = ErrorBody {
            success: false,
            error: message,
            code,
            details: details.filter(|_| EXPOSE_DETAILS.load(Ordering::Relaxed)),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => ApiError::Conflict("Resource already exists".into()),
                Some("23514") => ApiError::server(
                    DATABASE_CONSTRAINT_MESSAGE,
                    format!("Database error: {}", db_err),
                ),
                _ => ApiError::Internal(format!("Database error: {}", db_err)),
            },
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errors| {
                errors.iter().map(|e| {
                    e.message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
            })
            .collect();

        let message = if messages.len() == 1 {
            messages[0].clone()
        } else {
            format!("{} validation errors", messages.len())
        };

        ApiError::Validation(message)
    }
}
