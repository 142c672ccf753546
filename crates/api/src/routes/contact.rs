//! Contact form endpoint.

use axum::{extract::State, Json};
use domain::models::contact::{ContactFormRequest, ContactFormResponse};
use persistence::repositories::CallbackRequestRepository;
use shared::crypto::fingerprint;
use tracing::{error, info};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ApiJson;

pub const SEND_FAILED_MESSAGE: &str = "Failed to send email. Please try again later.";

/// `POST /api/send-email`.
///
/// The lead is stored before any email goes out, so a submission is never
/// lost to a mail outage. The auto-reply is sent in the background.
pub async fn send_email(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ContactFormRequest>,
) -> Result<Json<ContactFormResponse>, ApiError> {
    let submission = body
        .into_submission()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let repo = CallbackRequestRepository::new(state.pool.clone());
    let lead = repo
        .create(&submission.to_new_lead())
        .await
        .map_err(|e| ApiError::from(e).or_server(SEND_FAILED_MESSAGE))?;
    info!(
        lead_id = lead.id,
        source = %lead.source,
        visitor = %fingerprint(submission.name()),
        "Contact form submission saved"
    );

    state.mailer.notify_contact(&submission).await.map_err(|e| {
        error!(error = %e, lead_id = lead.id, "Contact notification failed");
        ApiError::server(SEND_FAILED_MESSAGE, e)
    })?;

    if let Some(email) = submission.email() {
        state.mailer.spawn_contact_auto_reply(submission.name(), email);
    }

    Ok(Json(ContactFormResponse::sent()))
}
