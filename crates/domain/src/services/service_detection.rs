//! Guesses which service a chat visitor was interested in.

use crate::models::chat::HistoryEntry;

/// Checked in order; the first category with a matching keyword wins.
const SERVICE_KEYWORDS: &[(&str, &[&str])] = &[
    ("ai assistant", &["ai assistant", "chatbot", "automation", "ai chat"]),
    ("seo", &["seo", "search engine", "google ranking", "local seo"]),
    ("website", &["website", "web design", "web development", "site"]),
    (
        "social media",
        &["social media", "facebook", "instagram", "linkedin", "social"],
    ),
    ("crm", &["crm", "sales funnel", "lead", "pipeline"]),
    (
        "analytics",
        &["analytics", "reporting", "data", "insights", "growth strategy"],
    ),
];

pub fn detect_service(transcript: &[HistoryEntry]) -> Option<&'static str> {
    let text = transcript
        .iter()
        .map(|entry| entry.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    SERVICE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|(service, _)| *service)
}
