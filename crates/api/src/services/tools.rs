//! Execution of the functions the chat model may call.
//!
//! Every outcome, including refusals and failures, is a JSON value handed
//! back to the model; nothing here fails the chat request.

use std::sync::Arc;

use async_trait::async_trait;
use domain::models::chat::ToolName;
use domain::models::lead::{LeadSource, NewLead, ReferenceKind};
use domain::models::tools::{
    CallbackOutcome, FetchWebpageArgs, RequestCallbackArgs, SearchOutcome, SearchWebArgs,
    WebpageOutcome,
};
use domain::services::analyze_html;
use persistence::repositories::{CallbackRequestRepository, SearchQueryRepository};
use serde::Serialize;
use serde_json::Value;
use shared::text::non_blank;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ToolsConfig;
use crate::middleware::metrics::record_tool_execution;
use crate::services::lead_emails::LeadMailer;
use crate::services::search::{BraveSearchClient, SearchError};
use crate::services::webpage::{parse_target, FetchError, WebpageFetcher};

const UNKNOWN_SESSION: &str = "unknown";

const SEARCH_UNAVAILABLE: &str = "Search temporarily unavailable";
const CALLBACK_FAILED: &str = "Failed to schedule callback. Please try again.";

/// Per-call context supplied by the chat request.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: Option<String>,
    /// Recent turns, stored with a callback request.
    pub conversation_context: String,
}

impl ToolContext {
    fn session_or_unknown(&self) -> &str {
        self.session_id.as_deref().unwrap_or(UNKNOWN_SESSION)
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, tool: ToolName, arguments: Value, context: &ToolContext) -> Value;
}

#[derive(Debug, Error)]
enum StepError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("search error: {0}")]
    Search(#[from] SearchError),
}

fn to_value<T: Serialize>(outcome: &T) -> Value {
    serde_json::to_value(outcome).unwrap_or(Value::Null)
}

/// Whether a search count should trigger the quota warning: at least 95%
/// of the quota, on every tenth search.
pub fn should_warn_quota(count: i64, quota: i64) -> bool {
    count * 100 >= quota * 95 && count % 10 == 0
}

/// Builds the lead for a callback request, or the refusal message.
pub fn callback_lead(args: &RequestCallbackArgs, context: &str) -> Result<NewLead, &'static str> {
    let name = non_blank(args.name.as_deref()).ok_or("Name is required")?;
    let phone = non_blank(args.phone.as_deref());
    let email = non_blank(args.email.as_deref());
    if phone.is_none() && email.is_none() {
        return Err("Please provide either a phone number or email address");
    }

    Ok(NewLead {
        name: name.to_string(),
        phone: phone.map(str::to_string),
        email: email.map(str::to_string),
        preferred_contact_method: non_blank(args.preferred_contact_method.as_deref())
            .unwrap_or("any")
            .to_string(),
        preferred_time: Some(
            non_blank(args.preferred_time.as_deref())
                .unwrap_or("ASAP")
                .to_string(),
        ),
        message: Some(args.message.clone().unwrap_or_default()),
        conversation_context: Some(context.to_string()),
        source: LeadSource::Chatbot,
        service: None,
    })
}

#[derive(Clone)]
pub struct ToolExecutor {
    config: Arc<ToolsConfig>,
    searches: SearchQueryRepository,
    leads: CallbackRequestRepository,
    brave: BraveSearchClient,
    fetcher: WebpageFetcher,
    mailer: LeadMailer,
}

impl ToolExecutor {
    pub fn new(
        config: Arc<ToolsConfig>,
        searches: SearchQueryRepository,
        leads: CallbackRequestRepository,
        brave: BraveSearchClient,
        fetcher: WebpageFetcher,
        mailer: LeadMailer,
    ) -> Self {
        Self {
            config,
            searches,
            leads,
            brave,
            fetcher,
            mailer,
        }
    }

    pub async fn search_web(&self, query: &str, context: &ToolContext) -> SearchOutcome {
        if !self.config.enable_web_search {
            return SearchOutcome::failed("Web search is currently disabled");
        }
        if self.config.brave_api_key.is_empty() {
            return SearchOutcome::failed("Search API key not configured");
        }

        match self.try_search(query, context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, query = %query, "Web search failed");
                SearchOutcome::failed(SEARCH_UNAVAILABLE)
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        context: &ToolContext,
    ) -> Result<SearchOutcome, StepError> {
        if let Some(session_id) = context.session_id.as_deref() {
            let used = self.searches.count_searches_for_session(session_id).await?;
            let max = self.config.max_searches_per_session;
            if used >= max {
                info!(session_id = %session_id, used, "Session search limit reached");
                return Ok(SearchOutcome::failed(format!(
                    "You've reached the maximum of {} searches for this conversation. I can still help answer your questions directly!",
                    max
                )));
            }
        }

        let quota = self.config.brave_monthly_quota;
        let monthly = self.searches.count_searches_this_month().await?;
        if should_warn_quota(monthly, quota) {
            self.mailer.spawn_quota_warning(monthly, quota);
        }
        if monthly >= quota {
            warn!(monthly, quota, "Monthly search quota exhausted");
            return Ok(SearchOutcome::failed(
                "Monthly search quota exceeded. I'll help you with the information I have!",
            ));
        }

        let results = self.brave.search(query).await?;
        self.searches
            .log_search(query, context.session_or_unknown(), results.len() as i32)
            .await?;

        info!(query = %query, results = results.len(), "Web search completed");
        Ok(SearchOutcome::found(query, results))
    }

    pub async fn fetch_webpage(&self, url: &str, context: &ToolContext) -> WebpageOutcome {
        let target = match parse_target(url) {
            Ok(target) => target,
            Err(e) => {
                warn!(url = %url, error = %e, "Refused webpage fetch");
                return WebpageOutcome::failed(e.user_message());
            }
        };

        if let Some(session_id) = context.session_id.as_deref() {
            match self.searches.count_fetches_for_session(session_id).await {
                Ok(used) if used >= self.config.max_webpage_fetches_per_session => {
                    info!(session_id = %session_id, used, "Session fetch limit reached");
                    return WebpageOutcome::failed(format!(
                        "You've reached the maximum of {} webpage fetches for this conversation. I can still help answer your questions!",
                        self.config.max_webpage_fetches_per_session
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Failed to count webpage fetches");
                    return WebpageOutcome::failed(FetchError::Other(e.to_string()).user_message());
                }
            }
        }

        let html = match self.fetcher.fetch(target).await {
            Ok(html) => html,
            Err(e) => {
                error!(url = %url, error = %e, "Webpage fetch failed");
                return WebpageOutcome::failed(e.user_message());
            }
        };

        let analysis = analyze_html(url, &html, self.config.max_content_chars);
        if let Err(e) = self
            .searches
            .log_webpage_fetch(url, context.session_or_unknown())
            .await
        {
            error!(error = %e, "Failed to log webpage fetch");
            return WebpageOutcome::failed(FetchError::Other(e.to_string()).user_message());
        }

        info!(
            url = %url,
            title = %shared::text::truncate_chars(&analysis.title, 50),
            chars = analysis.content_length,
            "Webpage analyzed"
        );
        WebpageOutcome::Analyzed(analysis)
    }

    pub async fn request_callback(
        &self,
        args: &RequestCallbackArgs,
        context: &ToolContext,
    ) -> CallbackOutcome {
        if !self.config.enable_callbacks {
            return CallbackOutcome::failed("Callback requests are currently disabled");
        }

        let new_lead = match callback_lead(args, &context.conversation_context) {
            Ok(lead) => lead,
            Err(message) => return CallbackOutcome::failed(message),
        };

        let lead = match self.leads.create(&new_lead).await {
            Ok(lead) => lead,
            Err(e) => {
                error!(error = %e, "Failed to store callback request");
                return CallbackOutcome::failed(CALLBACK_FAILED);
            }
        };

        let reference_id = lead.reference(ReferenceKind::Callback);
        info!(lead_id = lead.id, reference_id = %reference_id, "Callback scheduled");

        self.mailer.send_callback_emails(&lead, &reference_id).await;
        CallbackOutcome::scheduled(reference_id)
    }
}

fn parse_args<T: serde::de::DeserializeOwned + Default>(arguments: Value) -> T {
    serde_json::from_value(arguments).unwrap_or_default()
}

#[async_trait]
impl ToolRunner for ToolExecutor {
    async fn run(&self, tool: ToolName, arguments: Value, context: &ToolContext) -> Value {
        let (result, ok) = match tool {
            ToolName::SearchWeb => {
                let args: SearchWebArgs = parse_args(arguments);
                let outcome = self.search_web(&args.query, context).await;
                (to_value(&outcome), outcome.error.is_none())
            }
            ToolName::FetchWebpage => {
                let args: FetchWebpageArgs = parse_args(arguments);
                let outcome = self.fetch_webpage(&args.url, context).await;
                let ok = matches!(outcome, WebpageOutcome::Analyzed(_));
                (to_value(&outcome), ok)
            }
            ToolName::RequestCallback => {
                let args: RequestCallbackArgs = parse_args(arguments);
                let outcome = self.request_callback(&args, context).await;
                (to_value(&outcome), outcome.success)
            }
        };

        record_tool_execution(tool.as_str(), if ok { "success" } else { "refused" });
        result
    }
}
