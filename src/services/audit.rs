use crate::{
    context::RequestContext,
    db::{end_of_day_exclusive, fetch_page, start_of_day, DbPool, FilterBuilder, Page, PageWindow},
    entities::audit_log,
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use sea_orm::{ActiveModelTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::IntoParams;
use uuid::Uuid;

/// One change to be written to the audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub action: String,
    pub table_name: String,
    pub record_id: Option<Uuid>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        table_name: impl Into<String>,
        record_id: Option<Uuid>,
    ) -> Self {
        Self {
            action: action.into(),
            table_name: table_name.into(),
            record_id,
            ..Default::default()
        }
    }

    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogFilters {
    pub table_name: Option<String>,
    pub record_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    /// Inclusive lower bound on the creation date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date
    pub to: Option<NaiveDate>,
}

/// Writes and searches the audit trail.
#[derive(Clone)]
pub struct AuditService {
    db: Arc<DbPool>,
}

impl AuditService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Best-effort write. Failures are logged and counted, never returned.
    pub async fn record(&self, ctx: &RequestContext, entry: AuditEntry) {
        let row = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            user_id: Set(ctx.user_id),
            action: Set(entry.action.clone()),
            table_name: Set(entry.table_name.clone()),
            record_id: Set(entry.record_id),
            before: Set(entry.before),
            after: Set(entry.after),
            ip: Set(ctx.ip.clone()),
            user_agent: Set(ctx.user_agent.clone()),
            request_id: Set(ctx.request_id.clone()),
            created_at: Set(Utc::now()),
        };

        if let Err(err) = row.insert(self.db.as_ref()).await {
            counter!("planac_audit.write_failures", 1);
            warn!(
                error = %err,
                action = %entry.action,
                table = %entry.table_name,
                record_id = ?entry.record_id,
                "Audit write failed"
            );
        }
    }

    pub async fn search(
        &self,
        ctx: &RequestContext,
        filters: &AuditLogFilters,
        window: PageWindow,
    ) -> Result<Page<audit_log::Model>, ServiceError> {
        let condition = FilterBuilder::new()
            .eq(audit_log::Column::TenantId, ctx.tenant_id)
            .eq_opt(audit_log::Column::TableName, filters.table_name.clone())
            .eq_opt(audit_log::Column::RecordId, filters.record_id)
            .eq_opt(audit_log::Column::UserId, filters.user_id)
            .eq_opt(
                audit_log::Column::Action,
                filters.action.as_ref().map(|a| a.to_ascii_uppercase()),
            )
            .gte_opt(audit_log::Column::CreatedAt, filters.from.map(start_of_day))
            .lt_opt(
                audit_log::Column::CreatedAt,
                filters.to.map(end_of_day_exclusive),
            )
            .build();

        fetch_page::<audit_log::Entity, _, _>(
            self.db.as_ref(),
            condition,
            |q| {
                q.order_by_desc(audit_log::Column::CreatedAt)
                    .order_by_desc(audit_log::Column::Id)
            },
            window,
        )
        .await
        .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Snapshot {
        due_date: &'static str,
    }

    #[test]
    fn entry_captures_snapshots() {
        let id = Uuid::new_v4();
        let entry = AuditEntry::new("RESCHEDULE", "receivables", Some(id))
            .before(&Snapshot {
                due_date: "2024-05-10",
            })
            .after(&json!({"due_date": "2024-06-10", "reason": "customer request"}));

        assert_eq!(entry.action, "RESCHEDULE");
        assert_eq!(entry.record_id, Some(id));
        assert_eq!(entry.before, Some(json!({"due_date": "2024-05-10"})));
        assert_eq!(
            entry.after.as_ref().and_then(|v| v.get("reason")),
            Some(&json!("customer request"))
        );
    }
}
