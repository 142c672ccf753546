//! Brave Search web API.

use std::time::Duration;

use domain::models::tools::SearchResult;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ToolsConfig;

/// Results requested from and kept per query.
pub const RESULT_COUNT: usize = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Brave returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid response from Brave: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

impl BraveResponse {
    fn into_results(self) -> Vec<SearchResult> {
        self.web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(RESULT_COUNT)
            .map(|r| SearchResult {
                title: r.title,
                description: r.description,
                url: r.url,
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct BraveSearchClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl BraveSearchClient {
    pub fn new(config: &ToolsConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.search_timeout_secs))
            .build()
            .map_err(|e| SearchError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.brave_api_url.clone(),
            api_key: config.brave_api_key.clone(),
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        debug!(query = %query, "Calling Brave search");

        let count = RESULT_COUNT.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("q", query), ("count", count.as_str())])
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(parsed.into_results())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_results_are_capped() {
        let results: Vec<_> = (0..8)
            .map(|i| json!({"title": format!("t{}", i), "description": "d", "url": format!("https://e.com/{}", i), "age": "1d"}))
            .collect();
        let body = json!({"web": {"results": results}});

        let parsed: BraveResponse = serde_json::from_value(body).unwrap();
        let results = parsed.into_results();
        assert_eq!(results.len(), RESULT_COUNT);
        assert_eq!(results[0].title, "t0");
        assert_eq!(results[4].url, "https://e.com/4");
    }

    #[test]
    fn test_missing_web_section() {
        let parsed: BraveResponse = serde_json::from_value(json!({"query": {}})).unwrap();
        assert!(parsed.into_results().is_empty());
    }
}
