//! Tool arguments and outcomes.
//!
//! Outcomes are serialized twice: into the `tool` message sent back to the
//! model and into the `tool_result` notice shown by the widget. Failures are
//! ordinary outcomes carrying an `error` string the model can relay.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchWebArgs {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FetchWebpageArgs {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestCallbackArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_contact_method: Option<String>,
    #[serde(default)]
    pub preferred_time: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn found(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            results,
            query: Some(query.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            query: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebpageAnalysis {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub headings: Headings,
    pub content: String,
    pub content_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WebpageOutcome {
    Analyzed(WebpageAnalysis),
    Failed {
        error: String,
        content: Option<String>,
    },
}

impl WebpageOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        WebpageOutcome::Failed {
            error: error.into(),
            content: None,
        }
    }

    pub fn content_length(&self) -> usize {
        match self {
            WebpageOutcome::Analyzed(analysis) => analysis.content_length,
            WebpageOutcome::Failed { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackOutcome {
    pub fn scheduled(reference_id: String) -> Self {
        Self {
            success: true,
            message: Some(format!(
                "Callback scheduled successfully! Reference: {}",
                reference_id
            )),
            reference_id: Some(reference_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            reference_id: None,
            message: None,
            error: Some(error.into()),
        }
    }
}
