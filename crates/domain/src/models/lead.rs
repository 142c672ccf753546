//! Lead domain models.
//!
//! A lead is a row in `callback_requests`: a callback scheduled by the chat
//! assistant, a contact-form submission, or a transcript download request.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shared::pagination::{PageRequest, Pagination};
use shared::text::non_blank;
use std::str::FromStr;

/// Follow-up state of a lead, driven from the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Pending,
    Contacted,
    Completed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 3] = [
        LeadStatus::Pending,
        LeadStatus::Contacted,
        LeadStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Completed => "completed",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeadStatus::Pending),
            "contacted" => Ok(LeadStatus::Contacted),
            "completed" => Ok(LeadStatus::Completed),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    /// `request_callback` tool invoked by the chat assistant.
    Chatbot,
    /// Main contact form (general inquiry or blue slip quote).
    ContactForm,
    FooterForm,
    /// Visitor asked for the chat transcript by email.
    DownloadChat,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Chatbot => "chatbot",
            LeadSource::ContactForm => "contact_form",
            LeadSource::FooterForm => "footer_form",
            LeadSource::DownloadChat => "download_chat",
        }
    }
}

impl FromStr for LeadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chatbot" => Ok(LeadSource::Chatbot),
            "contact_form" => Ok(LeadSource::ContactForm),
            "footer_form" => Ok(LeadSource::FooterForm),
            "download_chat" => Ok(LeadSource::DownloadChat),
            _ => Err(format!("Unknown lead source: {}", s)),
        }
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prefix of the human-facing reference id handed to visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Callback,
    TranscriptDownload,
}

impl ReferenceKind {
    fn prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Callback => "CB",
            ReferenceKind::TranscriptDownload => "DL",
        }
    }
}

/// Lead as stored and as returned to the dashboard (raw column names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i32,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub preferred_contact_method: String,
    pub preferred_time: Option<String>,
    pub message: Option<String>,
    pub conversation_context: Option<String>,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub service: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Reference id in the form `CB-<created_at millis>-<id>`.
    pub fn reference(&self, kind: ReferenceKind) -> String {
        format!(
            "{}-{}-{}",
            kind.prefix(),
            self.created_at.timestamp_millis(),
            self.id
        )
    }
}

/// Insert input for a lead. Status always starts as pending.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub preferred_contact_method: String,
    pub preferred_time: Option<String>,
    pub message: Option<String>,
    pub conversation_context: Option<String>,
    pub source: LeadSource,
    pub service: Option<String>,
}

/// Query parameters of `GET /api/callbacks`.
///
/// Dates stay strings until parsed so that an empty `startDate=` from the
/// dashboard means "no filter" rather than a rejected request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLeadsQuery {
    pub status: Option<String>,
    pub source: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

/// Parsed, typed form of [`ListLeadsQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ListLeadsQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    /// Builds the repository filter. Unknown status or source values are
    /// ignored; a malformed date is an error.
    pub fn filter(&self) -> Result<LeadFilter, String> {
        let status = non_blank(self.status.as_deref()).and_then(|s| s.parse().ok());
        let source = non_blank(self.source.as_deref()).and_then(|s| s.parse().ok());

        let created_from = parse_date(self.start_date.as_deref(), "startDate")?
            .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        let created_until = parse_date(self.end_date.as_deref(), "endDate")?.and_then(|date| {
            NaiveTime::from_hms_opt(23, 59, 59)
                .map(|end_of_day| Utc.from_utc_datetime(&date.and_time(end_of_day)))
        });

        Ok(LeadFilter {
            status,
            source,
            created_from,
            created_until,
            search: non_blank(self.search.as_deref()).map(str::to_string),
        })
    }
}

fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, String> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("Invalid {}. Expected YYYY-MM-DD", field)),
    }
}

/// Body of `PATCH /api/callbacks/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLeadStatusRequest {
    #[serde(default)]
    pub status: String,
}

impl UpdateLeadStatusRequest {
    pub fn parsed_status(&self) -> Option<LeadStatus> {
        self.status.parse().ok()
    }
}

/// Aggregate counters shown at the top of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadStats {
    pub total: i64,
    pub pending: i64,
    pub contacted: i64,
    pub completed: i64,
    pub last_7_days: i64,
    pub last_30_days: i64,
}

/// Column metadata returned by the schema diagnostics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadListResponse {
    pub success: bool,
    pub data: Vec<Lead>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    pub data: Lead,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadStatsResponse {
    pub success: bool,
    pub data: LeadStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaResponse {
    pub success: bool,
    pub columns: Vec<SchemaColumn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead() -> Lead {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        Lead {
            id: 42,
            name: "Jane Citizen".to_string(),
            phone: Some("0400 000 000".to_string()),
            email: None,
            preferred_contact_method: "phone".to_string(),
            preferred_time: Some("ASAP".to_string()),
            message: None,
            conversation_context: None,
            status: LeadStatus::Pending,
            source: LeadSource::Chatbot,
            service: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_lead_status_round_trips_through_strings() {
        for status in LeadStatus::ALL {
            assert_eq!(status.as_str().parse::<LeadStatus>(), Ok(status));
        }
        assert!("Pending".parse::<LeadStatus>().is_err());
        assert!("archived".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn test_lead_source_display() {
        assert_eq!(LeadSource::ContactForm.to_string(), "contact_form");
        assert_eq!(LeadSource::DownloadChat.to_string(), "download_chat");
        assert_eq!(
            "footer_form".parse::<LeadSource>(),
            Ok(LeadSource::FooterForm)
        );
    }

    #[test]
    fn test_reference_ids() {
        let lead = sample_lead();
        let millis = lead.created_at.timestamp_millis();
        assert_eq!(
            lead.reference(ReferenceKind::Callback),
            format!("CB-{}-42", millis)
        );
        assert_eq!(
            lead.reference(ReferenceKind::TranscriptDownload),
            format!("DL-{}-42", millis)
        );
    }

    #[test]
    fn test_lead_serializes_with_column_names() {
        let json = serde_json::to_value(sample_lead()).unwrap();
        assert_eq!(json["preferred_contact_method"], "phone");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["source"], "chatbot");
        assert!(json["email"].is_null());
    }

    #[test]
    fn test_filter_ignores_unknown_status_and_source() {
        let query = ListLeadsQuery {
            status: Some("archived".to_string()),
            source: Some("newsletter".to_string()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.status, None);
        assert_eq!(filter.source, None);
    }

    #[test]
    fn test_filter_parses_known_values() {
        let query = ListLeadsQuery {
            status: Some("contacted".to_string()),
            source: Some("download_chat".to_string()),
            search: Some("  jane ".to_string()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.status, Some(LeadStatus::Contacted));
        assert_eq!(filter.source, Some(LeadSource::DownloadChat));
        assert_eq!(filter.search.as_deref(), Some("jane"));
    }

    #[test]
    fn test_filter_date_range_covers_whole_end_day() {
        let query = ListLeadsQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(
            filter.created_from,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            filter.created_until,
            Some(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap())
        );
    }

    #[test]
    fn test_filter_empty_dates_mean_no_filter() {
        let query = ListLeadsQuery {
            start_date: Some(String::new()),
            end_date: Some("  ".to_string()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert!(filter.created_from.is_none());
        assert!(filter.created_until.is_none());
    }

    #[test]
    fn test_filter_rejects_malformed_date() {
        let query = ListLeadsQuery {
            start_date: Some("01/02/2024".to_string()),
            ..Default::default()
        };
        let err = query.filter().unwrap_err();
        assert!(err.contains("startDate"));
    }

    #[test]
    fn test_page_request_defaults() {
        let page = ListLeadsQuery::default().page_request();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 50);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_update_status_request_parsing() {
        let valid: UpdateLeadStatusRequest =
            serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert_eq!(valid.parsed_status(), Some(LeadStatus::Completed));

        let missing: UpdateLeadStatusRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.parsed_status(), None);
    }
}
