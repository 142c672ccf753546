//! Admin dashboard API over `callback_requests`.
//!
//! Every handler except `admin_login` sits behind
//! [`require_admin`](crate::middleware::require_admin).

use axum::{
    extract::{Path, Query, State},
    Json,
};
use domain::models::lead::{
    LeadListResponse, LeadResponse, LeadStatsResponse, ListLeadsQuery, SchemaResponse,
    UpdateLeadStatusRequest,
};
use persistence::repositories::CallbackRequestRepository;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ApiJson;
use crate::middleware::verify_admin_password;

pub const INVALID_STATUS_MESSAGE: &str =
    "Invalid status. Must be: pending, contacted, or completed";
pub const NOT_FOUND_MESSAGE: &str = "Callback not found";

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub success: bool,
    pub message: String,
}

/// `POST /api/admin/login`: lets the dashboard check a password before
/// storing it for later requests.
pub async fn admin_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AdminLoginRequest>,
) -> Result<Json<AdminLoginResponse>, ApiError> {
    verify_admin_password(state.config.admin.password(), body.password.as_deref()).map_err(
        |err| match err {
            ApiError::Unauthorized(_) => {
                tracing::warn!("Dashboard login rejected");
                ApiError::Unauthorized("Invalid password".to_string())
            }
            other => other,
        },
    )?;

    Ok(Json(AdminLoginResponse {
        success: true,
        message: "Authentication successful".to_string(),
    }))
}

/// `GET /api/callbacks`: filtered, paginated, newest first.
pub async fn list_callbacks(
    State(state): State<AppState>,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<LeadListResponse>, ApiError> {
    let filter = query.filter().map_err(ApiError::Validation)?;
    let page = query.page_request();

    let repo = CallbackRequestRepository::new(state.pool.clone());
    let (data, total) = repo
        .list(&filter, &page)
        .await
        .map_err(|e| ApiError::from(e).or_server("Failed to retrieve callbacks"))?;

    Ok(Json(LeadListResponse {
        success: true,
        data,
        pagination: page.paginate(total),
    }))
}

/// `GET /api/callbacks/:id`.
pub async fn get_callback(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<LeadResponse>, ApiError> {
    let repo = CallbackRequestRepository::new(state.pool.clone());
    let lead = repo
        .find_by_id(id)
        .await
        .map_err(|e| ApiError::from(e).or_server("Failed to retrieve callback"))?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    Ok(Json(LeadResponse {
        success: true,
        data: lead,
        message: None,
    }))
}

/// `PATCH /api/callbacks/:id`.
pub async fn update_callback_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ApiJson(body): ApiJson<UpdateLeadStatusRequest>,
) -> Result<Json<LeadResponse>, ApiError> {
    let status = body
        .parsed_status()
        .ok_or_else(|| ApiError::Validation(INVALID_STATUS_MESSAGE.to_string()))?;

    let repo = CallbackRequestRepository::new(state.pool.clone());
    let lead = repo
        .update_status(id, status)
        .await
        .map_err(|e| ApiError::from(e).or_server("Failed to update callback"))?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    info!(lead_id = id, status = %status, "Callback status updated");

    Ok(Json(LeadResponse {
        success: true,
        data: lead,
        message: Some(format!("Callback status updated to {}", status)),
    }))
}

/// `GET /api/callbacks-stats`.
pub async fn callback_stats(
    State(state): State<AppState>,
) -> Result<Json<LeadStatsResponse>, ApiError> {
    let repo = CallbackRequestRepository::new(state.pool.clone());
    let stats = repo
        .stats()
        .await
        .map_err(|e| ApiError::from(e).or_server("Failed to retrieve statistics"))?;

    Ok(Json(LeadStatsResponse {
        success: true,
        data: stats,
    }))
}

/// `GET /api/test-schema`: live column list of `callback_requests`, used
/// to diagnose deployments with a stale schema.
pub async fn test_schema(State(state): State<AppState>) -> Result<Json<SchemaResponse>, ApiError> {
    let repo = CallbackRequestRepository::new(state.pool.clone());
    let columns = repo
        .schema_columns()
        .await
        .map_err(|e| ApiError::from(e).or_server("Failed to read schema"))?;

    Ok(Json(SchemaResponse {
        success: true,
        columns,
    }))
}
