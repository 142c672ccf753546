//! Page fetching for the `fetch_webpage` tool.
//!
//! Only public hosts are fetched. The host check runs on the requested URL
//! and again on every redirect hop.

use std::net::IpAddr;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::{redirect, Client, StatusCode, Url};
use shared::validation::is_http_url;
use thiserror::Error;
use tracing::debug;

use crate::config::ToolsConfig;

pub const MAX_REDIRECTS: usize = 5;

/// Bytes of a page body read before the rest is dropped.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub const INVALID_URL_MESSAGE: &str =
    "Invalid URL format. Please provide a complete URL starting with http:// or https://";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url")]
    InvalidUrl,

    #[error("host {0} is not publicly routable")]
    BlockedHost(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("page not found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Wording relayed to the model.
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl => INVALID_URL_MESSAGE,
            FetchError::BlockedHost(_) => {
                "That address cannot be fetched. Please provide a public website URL."
            }
            FetchError::Connect(_) => {
                "Could not connect to that website. Please check the URL is correct."
            }
            FetchError::NotFound => {
                "Page not found (404). The URL may be incorrect or the page may have been removed."
            }
            FetchError::Timeout => {
                "The website took too long to respond. It may be down or very slow."
            }
            FetchError::Other(_) => {
                "Unable to fetch webpage content. The site may be blocking automated access."
            }
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // 100.64.0.0/10 carrier-grade NAT
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

/// Rejects loopback, private and link-local literals and `localhost` names.
/// Names are not resolved.
pub fn check_public_host(url: &Url) -> Result<(), FetchError> {
    let host = url.host_str().ok_or(FetchError::InvalidUrl)?;
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let lowered = bare.to_ascii_lowercase();

    if lowered == "localhost" || lowered.ends_with(".localhost") {
        return Err(FetchError::BlockedHost(host.to_string()));
    }
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(FetchError::BlockedHost(host.to_string()));
        }
    }
    Ok(())
}

/// Parses a tool-supplied URL and applies the scheme and host checks.
pub fn parse_target(raw: &str) -> Result<Url, FetchError> {
    if !is_http_url(raw) {
        return Err(FetchError::InvalidUrl);
    }
    let url = Url::parse(raw).map_err(|_| FetchError::InvalidUrl)?;
    check_public_host(&url)?;
    Ok(url)
}

#[derive(Clone)]
pub struct WebpageFetcher {
    client: Client,
}

impl WebpageFetcher {
    pub fn new(config: &ToolsConfig) -> Result<Self, FetchError> {
        let policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if let Err(e) = check_public_host(attempt.url()) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .redirect(policy)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;

        Ok(Self { client })
    }

    /// Returns the page body as text.
    pub async fn fetch(&self, url: Url) -> Result<String, FetchError> {
        debug!(url = %url, "Fetching webpage");

        let response = self
            .client
            .get(url)
            .header("Accept", ACCEPT)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Other(format!("HTTP {}", status)));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_BODY_BYTES as u64 {
                debug!(length, limit = MAX_BODY_BYTES, "Webpage body will be truncated");
            }
        }

        let body = read_capped(response.bytes_stream(), MAX_BODY_BYTES)
            .await
            .map_err(FetchError::from_reqwest)?;
        debug!(status = %status, bytes = body.len(), "Webpage fetched");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Collects at most `limit` bytes and stops polling `chunks` once there.
async fn read_capped<S, B, E>(chunks: S, limit: usize) -> Result<Vec<u8>, E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut body = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(chunk);
    }
    Ok(body)
}
