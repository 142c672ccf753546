//! Callback request (lead) repository.

use domain::models::lead::{Lead, LeadFilter, LeadStats, LeadStatus, NewLead, SchemaColumn};
use shared::pagination::PageRequest;
use sqlx::PgPool;

use crate::entities::{CallbackRequestEntity, ColumnInfoEntity, LeadStatsEntity};
use crate::metrics::QueryTimer;

const LEAD_COLUMNS: &str = "id, name, phone, email, preferred_contact_method, preferred_time, \
     message, conversation_context, status, source, service, created_at, updated_at";

/// Builds the dynamic WHERE clause for the dashboard list and keeps track of
/// parameter positions so the count and page queries bind identically.
struct LeadFilterBuilder {
    conditions: Vec<String>,
    param_count: usize,
}

impl LeadFilterBuilder {
    fn build(filter: &LeadFilter) -> Self {
        let mut conditions = Vec::new();
        let mut param_count = 0;

        if filter.status.is_some() {
            param_count += 1;
            conditions.push(format!("status = ${}", param_count));
        }

        if filter.source.is_some() {
            param_count += 1;
            conditions.push(format!("source = ${}", param_count));
        }

        if filter.created_from.is_some() {
            param_count += 1;
            conditions.push(format!("created_at >= ${}", param_count));
        }

        if filter.created_until.is_some() {
            param_count += 1;
            conditions.push(format!("created_at <= ${}", param_count));
        }

        if filter.search.is_some() {
            param_count += 1;
            conditions.push(format!(
                "(name ILIKE ${0} OR email ILIKE ${0} OR phone ILIKE ${0})",
                param_count
            ));
        }

        Self {
            conditions,
            param_count,
        }
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }
}

/// Binds the optional filter values in the order `LeadFilterBuilder` numbered them.
macro_rules! bind_lead_filters {
    ($builder:expr, $filter:expr) => {{
        let mut b = $builder;
        if let Some(status) = $filter.status {
            b = b.bind(status.as_str());
        }
        if let Some(source) = $filter.source {
            b = b.bind(source.as_str());
        }
        if let Some(from) = $filter.created_from {
            b = b.bind(from);
        }
        if let Some(until) = $filter.created_until {
            b = b.bind(until);
        }
        if let Some(ref search) = $filter.search {
            b = b.bind(format!("%{}%", search));
        }
        b
    }};
}

impl From<LeadStatsEntity> for LeadStats {
    fn from(entity: LeadStatsEntity) -> Self {
        LeadStats {
            total: entity.total,
            pending: entity.pending,
            contacted: entity.contacted,
            completed: entity.completed,
            last_7_days: entity.last_7_days,
            last_30_days: entity.last_30_days,
        }
    }
}

/// Repository for `callback_requests`.
#[derive(Clone)]
pub struct CallbackRequestRepository {
    pool: PgPool,
}

impl CallbackRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a lead with status `pending`. A missing preferred time falls
    /// back to `ASAP`, the column default.
    pub async fn create(&self, lead: &NewLead) -> Result<Lead, sqlx::Error> {
        let timer = QueryTimer::new("create_lead");
        let query = format!(
            r#"
            INSERT INTO callback_requests (
                name, phone, email, preferred_contact_method, preferred_time,
                message, conversation_context, source, service, status
            )
            VALUES ($1, $2, $3, $4, COALESCE($5, 'ASAP'), $6, $7, $8, $9, 'pending')
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );
        let result = sqlx::query_as::<_, CallbackRequestEntity>(&query)
            .bind(&lead.name)
            .bind(&lead.phone)
            .bind(&lead.email)
            .bind(&lead.preferred_contact_method)
            .bind(&lead.preferred_time)
            .bind(&lead.message)
            .bind(&lead.conversation_context)
            .bind(lead.source.as_str())
            .bind(&lead.service)
            .fetch_one(&self.pool)
            .await;
        timer.record();

        let lead: Lead = result?.into();
        metrics::counter!("leads_created_total", "source" => lead.source.as_str()).increment(1);
        Ok(lead)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Lead>, sqlx::Error> {
        let timer = QueryTimer::new("find_lead_by_id");
        let query = format!("SELECT {} FROM callback_requests WHERE id = $1", LEAD_COLUMNS);
        let result = sqlx::query_as::<_, CallbackRequestEntity>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        Ok(result?.map(Lead::from))
    }

    /// One page of leads, newest first, and the total matching the filter.
    pub async fn list(
        &self,
        filter: &LeadFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Lead>, i64), sqlx::Error> {
        let builder = LeadFilterBuilder::build(filter);
        let where_clause = builder.where_clause();

        let timer = QueryTimer::new("count_leads");
        let count_query = format!("SELECT COUNT(*) FROM callback_requests {}", where_clause);
        let count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        let total = bind_lead_filters!(count_builder, filter)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        let total = total?;

        let timer = QueryTimer::new("list_leads");
        let list_query = format!(
            r#"
            SELECT {}
            FROM callback_requests
            {}
            ORDER BY created_at DESC
            LIMIT ${} OFFSET ${}
            "#,
            LEAD_COLUMNS,
            where_clause,
            builder.param_count + 1,
            builder.param_count + 2
        );
        let list_builder = sqlx::query_as::<_, CallbackRequestEntity>(&list_query);
        let entities = bind_lead_filters!(list_builder, filter)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await;
        timer.record();

        let leads = entities?.into_iter().map(Lead::from).collect();
        Ok((leads, total))
    }

    /// Sets the status and bumps `updated_at`. `None` when the id is unknown.
    pub async fn update_status(
        &self,
        id: i32,
        status: LeadStatus,
    ) -> Result<Option<Lead>, sqlx::Error> {
        let timer = QueryTimer::new("update_lead_status");
        let query = format!(
            r#"
            UPDATE callback_requests
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );
        let result = sqlx::query_as::<_, CallbackRequestEntity>(&query)
            .bind(status.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        Ok(result?.map(Lead::from))
    }

    pub async fn stats(&self) -> Result<LeadStats, sqlx::Error> {
        let timer = QueryTimer::new("lead_stats");
        let result = sqlx::query_as::<_, LeadStatsEntity>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'contacted') AS contacted,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') AS last_7_days,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS last_30_days
            FROM callback_requests
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();
        Ok(result?.into())
    }

    /// Column metadata of `callback_requests`, for diagnosing a drifted schema.
    pub async fn schema_columns(&self) -> Result<Vec<SchemaColumn>, sqlx::Error> {
        let timer = QueryTimer::new("lead_schema_columns");
        let result = sqlx::query_as::<_, ColumnInfoEntity>(
            r#"
            SELECT column_name::text AS column_name,
                   data_type::text AS data_type,
                   is_nullable::text AS is_nullable,
                   column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_name = 'callback_requests'
            ORDER BY ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result?.into_iter().map(SchemaColumn::from).collect())
    }
}
