//! Client for the OpenAI-compatible chat-completion API (OpenRouter by
//! default).

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use domain::models::chat::{CompletionRequest, CompletionResponse};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::{ChatConfig, SiteConfig};
use crate::error::ApiError;

pub const AUTH_FAILED_MESSAGE: &str = "AI service authentication failed";
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
pub const TIMEOUT_MESSAGE: &str = "AI service timeout. Please try again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to get AI response. Please try again later.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Upstream rejected the API key")]
    Unauthorized,

    #[error("Upstream rate limit exceeded")]
    RateLimited,

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response from upstream: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(err.to_string())
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unauthorized => ApiError::server(AUTH_FAILED_MESSAGE, err),
            LlmError::RateLimited => ApiError::RateLimited(RATE_LIMITED_MESSAGE.to_string()),
            LlmError::Timeout => ApiError::GatewayTimeout(TIMEOUT_MESSAGE.to_string()),
            other => ApiError::server(GENERIC_FAILURE_MESSAGE, other),
        }
    }
}

/// Raw body chunks of a streaming completion.
pub type ByteStream = BoxStream<'static, Result<Bytes, LlmError>>;

#[async_trait]
pub trait ChatCompletionApi: Send + Sync {
    /// One non-streaming completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Opens a streaming completion. Resolves once the upstream has answered
    /// with a success status, so failures surface before any byte is sent
    /// to the client.
    ///
    /// `timeout` bounds the wait for the response head and then the gap
    /// between body chunks. A reply that keeps delivering tokens is never
    /// cut off.
    async fn stream(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<ByteStream, LlmError>;
}

pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    referer: String,
    title: String,
    request_timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(chat: &ChatConfig, site: &SiteConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", chat.api_url.trim_end_matches('/')),
            api_key: chat.api_key.clone(),
            referer: site.url.clone(),
            title: site.name.clone(),
            request_timeout: Duration::from_secs(chat.request_timeout_secs),
        })
    }

    fn post(&self, request: &CompletionRequest) -> RequestBuilder {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(request)
    }

    async fn check_status(response: Response) -> Result<Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Chat completion request rejected");
        Err(match status {
            StatusCode::UNAUTHORIZED => LlmError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
            _ => LlmError::Upstream {
                status: status.as_u16(),
                body,
            },
        })
    }
}

#[async_trait]
impl ChatCompletionApi for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model, messages = request.messages.len(), "Requesting completion");

        let response = self
            .post(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<ByteStream, LlmError> {
        debug!(model = %request.model, messages = request.messages.len(), "Opening completion stream");

        let response = tokio::time::timeout(timeout, async {
            let response = self
                .post(request)
                .send()
                .await
                .map_err(LlmError::from_reqwest)?;
            Self::check_status(response).await
        })
        .await
        .map_err(|_| LlmError::Timeout)??;

        Ok(idle_timeout(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(LlmError::from_reqwest)),
            timeout,
        ))
    }
}

/// Ends `inner` with `LlmError::Timeout` once no chunk arrives within `idle`.
fn idle_timeout<S>(inner: S, idle: Duration) -> ByteStream
where
    S: Stream<Item = Result<Bytes, LlmError>> + Send + 'static,
{
    stream::unfold(Some(inner.boxed()), move |state| async move {
        let Some(mut inner) = state else {
            return None;
        };
        match tokio::time::timeout(idle, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => Some((Err(LlmError::Timeout), None)),
        }
    })
    .boxed()
}
