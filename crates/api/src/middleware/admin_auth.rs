//! Shared-password guard for the dashboard API.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::crypto::secrets_match;

use crate::app::AppState;
use crate::error::ApiError;

pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

pub const NOT_CONFIGURED_MESSAGE: &str = "Admin authentication not configured";

/// Checks a password against the configured one. Errors are ready to
/// return from a handler.
pub fn verify_admin_password(
    configured: Option<&str>,
    provided: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = configured else {
        return Err(ApiError::server(
            NOT_CONFIGURED_MESSAGE,
            "admin.dashboard_password is not set",
        ));
    };

    match provided {
        Some(provided) if secrets_match(provided, expected) => Ok(()),
        _ => Err(ApiError::Unauthorized("Unauthorized".to_string())),
    }
}

fn header_password(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// Rejects requests whose `x-admin-password` header does not match
/// `admin.dashboard_password`.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match verify_admin_password(state.config.admin.password(), header_password(req.headers())) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            if matches!(err, ApiError::Unauthorized(_)) {
                tracing::warn!(path = %req.uri().path(), "Rejected dashboard request");
            }
            err.into_response()
        }
    }
}
