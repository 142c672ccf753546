//! Callback request (lead) entity.

use chrono::{DateTime, Utc};
use domain::models::lead::{Lead, LeadSource, LeadStatus, SchemaColumn};
use sqlx::FromRow;

/// Database row of `callback_requests`.
#[derive(Debug, Clone, FromRow)]
pub struct CallbackRequestEntity {
    pub id: i32,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub preferred_contact_method: String,
    pub preferred_time: Option<String>,
    pub message: Option<String>,
    pub conversation_context: Option<String>,
    /// Constrained by `callback_requests_status_check`.
    pub status: String,
    /// Constrained by `callback_requests_source_check`.
    pub source: String,
    pub service: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CallbackRequestEntity> for Lead {
    fn from(entity: CallbackRequestEntity) -> Self {
        let status = entity.status.parse().unwrap_or_else(|_| {
            tracing::warn!(id = entity.id, status = %entity.status, "Unexpected lead status in database");
            LeadStatus::Pending
        });
        let source = entity.source.parse().unwrap_or_else(|_| {
            tracing::warn!(id = entity.id, source = %entity.source, "Unexpected lead source in database");
            LeadSource::Chatbot
        });

        Lead {
            id: entity.id,
            name: entity.name,
            phone: entity.phone,
            email: entity.email,
            preferred_contact_method: entity.preferred_contact_method,
            preferred_time: entity.preferred_time,
            message: entity.message,
            conversation_context: entity.conversation_context,
            status,
            source,
            service: entity.service,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Aggregate counters over `callback_requests`.
#[derive(Debug, Clone, FromRow)]
pub struct LeadStatsEntity {
    pub total: i64,
    pub pending: i64,
    pub contacted: i64,
    pub completed: i64,
    pub last_7_days: i64,
    pub last_30_days: i64,
}

/// Row of `information_schema.columns`.
#[derive(Debug, Clone, FromRow)]
pub struct ColumnInfoEntity {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
}

impl From<ColumnInfoEntity> for SchemaColumn {
    fn from(entity: ColumnInfoEntity) -> Self {
        SchemaColumn {
            column_name: entity.column_name,
            data_type: entity.data_type,
            is_nullable: entity.is_nullable,
            column_default: entity.column_default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::faker::name::en::Name;
    use fake::Fake;

    fn entity(status: &str, source: &str) -> CallbackRequestEntity {
        let now = Utc::now();
        CallbackRequestEntity {
            id: 7,
            name: Name().fake(),
            phone: None,
            email: Some(SafeEmail().fake()),
            preferred_contact_method: "email".to_string(),
            preferred_time: Some("ASAP".to_string()),
            message: Some("Requested chat transcript download".to_string()),
            conversation_context: Some("User: hi".to_string()),
            status: status.to_string(),
            source: source.to_string(),
            service: Some("seo".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_entity_to_lead() {
        let lead: Lead = entity("contacted", "download_chat").into();
        assert_eq!(lead.id, 7);
        assert_eq!(lead.status, LeadStatus::Contacted);
        assert_eq!(lead.source, LeadSource::DownloadChat);
        assert_eq!(lead.service.as_deref(), Some("seo"));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let lead: Lead = entity("archived", "fax").into();
        assert_eq!(lead.status, LeadStatus::Pending);
        assert_eq!(lead.source, LeadSource::Chatbot);
    }
}
