//! Lightweight page analysis for the `fetch_webpage` tool.
//!
//! This is pattern matching over raw markup, not a DOM parse. It extracts
//! enough structure for the model to comment on a page's SEO and copy.

use crate::models::tools::{Headings, WebpageAnalysis};
use lazy_static::lazy_static;
use regex::Regex;
use shared::text::truncate_with_suffix;

/// Visible text kept from a page, in characters.
pub const MAX_CONTENT_CHARS: usize = 8000;

pub const TRUNCATION_SUFFIX: &str = "... [content truncated]";

const MAX_H2: usize = 10;

lazy_static! {
    static ref TITLE: Regex = Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap();
    static ref META_DESCRIPTION: Regex = Regex::new(
        r#"(?i)<meta[^>]*name=["']description["'][^>]*content=["']([^"']+)["']"#
    )
    .unwrap();
    static ref SCRIPT: Regex = Regex::new(r"(?is)<script\b.*?</script>").unwrap();
    static ref STYLE: Regex = Regex::new(r"(?is)<style\b.*?</style>").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref H1: Regex = Regex::new(r"(?i)<h1[^>]*>([^<]+)</h1>").unwrap();
    static ref H2: Regex = Regex::new(r"(?i)<h2[^>]*>([^<]+)</h2>").unwrap();
}

pub fn analyze_html(url: &str, html: &str, max_content_chars: usize) -> WebpageAnalysis {
    let title = TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "No title".to_string());

    let meta_description = META_DESCRIPTION
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let content = truncate_with_suffix(&visible_text(html), max_content_chars, TRUNCATION_SUFFIX);

    WebpageAnalysis {
        url: url.to_string(),
        title,
        meta_description,
        headings: Headings {
            h1: headings(&H1, html, usize::MAX),
            h2: headings(&H2, html, MAX_H2),
        },
        content_length: content.chars().count(),
        content,
    }
}

fn visible_text(html: &str) -> String {
    let without_scripts = SCRIPT.replace_all(html, "");
    let without_styles = STYLE.replace_all(&without_scripts, "");
    let without_tags = TAG.replace_all(&without_styles, " ");
    WHITESPACE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

fn headings(pattern: &Regex, html: &str, limit: usize) -> Vec<String> {
    pattern
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .take(limit)
        .collect()
}
