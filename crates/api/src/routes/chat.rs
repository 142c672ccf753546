//! Chat widget endpoints.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use domain::models::chat::{
    transcript_context, ChatConfigResponse, ChatRequest, TranscriptRequest, TranscriptResponse,
};
use domain::models::lead::{LeadSource, NewLead, ReferenceKind};
use domain::services::detect_service;
use persistence::repositories::CallbackRequestRepository;
use shared::crypto::fingerprint;
use shared::validation::is_valid_email;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ApiJson;
use crate::services::chat::NOT_CONFIGURED_MESSAGE;
use crate::services::lead_emails::TranscriptLead;

pub const TRANSCRIPT_SENT_MESSAGE: &str = "Chat transcript sent successfully! Check your email.";
pub const TRANSCRIPT_FAILED_MESSAGE: &str = "Failed to send transcript. Please try again.";

const TRANSCRIPT_LEAD_NAME: &str = "Chat Download Request";

/// `POST /api/chat`: an event stream or a single JSON answer depending on
/// `chat.use_streaming`.
pub async fn chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;

    if !state.chat.is_available() {
        return Err(ApiError::server(
            NOT_CONFIGURED_MESSAGE,
            "chat.api_key is not set",
        ));
    }

    if !state.chat.uses_streaming() {
        let reply = state.chat.reply(&request).await?;
        return Ok(Json(reply).into_response());
    }

    let receiver = state.chat.open_stream(&request).await?;
    let events = ReceiverStream::new(receiver)
        .map(|payload| Ok::<_, Infallible>(Event::default().data(payload)));
    let keep_alive =
        KeepAlive::new().interval(Duration::from_secs(state.config.chat.keep_alive_secs));

    let mut response = Sse::new(events).keep_alive(keep_alive).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

/// `GET /api/chat/config`.
pub async fn chat_config(State(state): State<AppState>) -> Json<ChatConfigResponse> {
    let chat = &state.config.chat;
    let tools = &state.config.tools;
    Json(ChatConfigResponse {
        available: chat.is_available(),
        model: chat.model.clone(),
        max_tokens: chat.max_tokens,
        suggested_questions: chat.suggestions(),
        web_search_enabled: tools.enable_web_search,
        callbacks_enabled: tools.enable_callbacks,
    })
}

fn validate_transcript(request: &TranscriptRequest) -> Result<&str, ApiError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }
    if request.transcript.is_empty() {
        return Err(ApiError::Validation("Chat transcript is required".to_string()));
    }
    if !is_valid_email(email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }
    Ok(email)
}

fn transcript_lead(email: &str, request: &TranscriptRequest) -> NewLead {
    NewLead {
        name: TRANSCRIPT_LEAD_NAME.to_string(),
        phone: None,
        email: Some(email.to_string()),
        preferred_contact_method: "email".to_string(),
        preferred_time: None,
        message: Some("Requested chat transcript download".to_string()),
        conversation_context: Some(transcript_context(&request.transcript)),
        source: LeadSource::DownloadChat,
        service: detect_service(&request.transcript).map(str::to_string),
    }
}

/// `POST /api/chat/email-transcript`: stores the conversation as a lead,
/// mails it to the visitor and notifies the team.
pub async fn email_transcript(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TranscriptRequest>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let email = validate_transcript(&request)?;

    let repo = CallbackRequestRepository::new(state.pool.clone());
    let lead = repo
        .create(&transcript_lead(email, &request))
        .await
        .map_err(|e| ApiError::from(e).or_server(TRANSCRIPT_FAILED_MESSAGE))?;

    let reference_id = lead.reference(ReferenceKind::TranscriptDownload);
    info!(
        lead_id = lead.id,
        reference_id = %reference_id,
        visitor = %fingerprint(email),
        "Transcript download lead saved"
    );

    state
        .mailer
        .send_transcript(email, &request.transcript, &reference_id)
        .await
        .map_err(|e| {
            error!(error = %e, lead_id = lead.id, "Transcript email failed");
            ApiError::server(TRANSCRIPT_FAILED_MESSAGE, e)
        })?;

    let details = TranscriptLead {
        lead: &lead,
        reference_id: &reference_id,
        session_id: request.session_id.as_deref(),
        detected_service: lead.service.as_deref(),
    };
    state.mailer.notify_transcript(&details).await.map_err(|e| {
        error!(error = %e, lead_id = lead.id, "Transcript notification failed");
        ApiError::server(TRANSCRIPT_FAILED_MESSAGE, e)
    })?;

    Ok(Json(TranscriptResponse {
        success: true,
        message: TRANSCRIPT_SENT_MESSAGE.to_string(),
        reference_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use domain::models::chat::HistoryEntry;

    fn transcript_request(email: &str, turns: usize) -> TranscriptRequest {
        TranscriptRequest {
            email: email.to_string(),
            transcript: (0..turns)
                .map(|i| HistoryEntry {
                    role: if i % 2 == 0 { "user" } else { "assistant" }.to_string(),
                    content: "We need better SEO".to_string(),
                })
                .collect(),
            session_id: None,
        }
    }

    fn message_of(err: ApiError) -> String {
        match err {
            ApiError::Validation(msg) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_transcript_validation_order() {
        assert_eq!(
            message_of(validate_transcript(&transcript_request(" ", 0)).unwrap_err()),
            "Email is required"
        );
        assert_eq!(
            message_of(validate_transcript(&transcript_request("a@b.co", 0)).unwrap_err()),
            "Chat transcript is required"
        );
        assert_eq!(
            message_of(validate_transcript(&transcript_request("nope", 2)).unwrap_err()),
            "Invalid email format"
        );
        assert_eq!(
            validate_transcript(&transcript_request(" a@b.co ", 2)).unwrap(),
            "a@b.co"
        );
    }

    #[test]
    fn test_validation_is_a_bad_request() {
        let err = validate_transcript(&transcript_request("", 1)).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_transcript_lead() {
        let request = transcript_request("v@example.com", 2);
        let lead = transcript_lead("v@example.com", &request);
        assert_eq!(lead.name, TRANSCRIPT_LEAD_NAME);
        assert_eq!(lead.source, LeadSource::DownloadChat);
        assert_eq!(lead.preferred_contact_method, "email");
        assert_eq!(lead.service.as_deref(), Some("seo"));
        assert_eq!(
            lead.conversation_context.as_deref(),
            Some("User: We need better SEO\n\nAI Assistant: We need better SEO")
        );
    }
}
