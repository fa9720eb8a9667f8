use crate::{
    context::RequestContext,
    db::{fetch_page, DbPool, FilterBuilder, Page, PageWindow},
    entities::till,
    errors::ServiceError,
    services::{
        audit::{AuditEntry, AuditService},
        require_non_negative, require_text,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTill {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub branch_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub withdrawal_limit: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TillPatch {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub bank_account_id: Option<Uuid>,
    pub withdrawal_limit: Option<Decimal>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TillFilters {
    pub active: Option<bool>,
    pub branch_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct TillService {
    db: Arc<DbPool>,
    audit: AuditService,
}

impl TillService {
    pub fn new(db: Arc<DbPool>, audit: AuditService) -> Self {
        Self { db, audit }
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateTill,
    ) -> Result<till::Model, ServiceError> {
        input.validate()?;
        require_text("name", &input.name)?;
        if let Some(limit) = input.withdrawal_limit {
            require_non_negative("withdrawal_limit", limit)?;
        }

        let now = Utc::now();
        let created = till::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            branch_id: Set(input.branch_id.or(ctx.branch_id)),
            name: Set(input.name.trim().to_string()),
            bank_account_id: Set(input.bank_account_id),
            withdrawal_limit: Set(input.withdrawal_limit),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        info!(till_id = %created.id, name = %created.name, "Till created");
        self.audit
            .record(ctx, AuditEntry::new("CREATE", "tills", Some(created.id)).after(&created))
            .await;
        Ok(created)
    }

    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<till::Model, ServiceError> {
        find_till(self.db.as_ref(), ctx.tenant_id, id).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filters: &TillFilters,
        window: PageWindow,
    ) -> Result<Page<till::Model>, ServiceError> {
        let condition = FilterBuilder::new()
            .eq(till::Column::TenantId, ctx.tenant_id)
            .eq_opt(till::Column::Active, filters.active)
            .eq_opt(till::Column::BranchId, filters.branch_id)
            .build();

        fetch_page::<till::Entity, _, _>(
            self.db.as_ref(),
            condition,
            |q| q.order_by_asc(till::Column::Name),
            window,
        )
        .await
        .map_err(ServiceError::db_error)
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        patch: TillPatch,
    ) -> Result<till::Model, ServiceError> {
        patch.validate()?;
        if let Some(limit) = patch.withdrawal_limit {
            require_non_negative("withdrawal_limit", limit)?;
        }
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }

        let db = self.db.as_ref();
        let current = find_till(db, ctx.tenant_id, id).await?;
        let mut active: till::ActiveModel = current.clone().into();
        let mut changed = false;
        if let Some(name) = patch.name {
            active.name = Set(name.trim().to_string());
            changed = true;
        }
        if let Some(account) = patch.bank_account_id {
            active.bank_account_id = Set(Some(account));
            changed = true;
        }
        if let Some(limit) = patch.withdrawal_limit {
            active.withdrawal_limit = Set(Some(limit));
            changed = true;
        }
        if let Some(flag) = patch.active {
            active.active = Set(flag);
            changed = true;
        }
        if !changed {
            return Err(ServiceError::ValidationError(
                "no updatable fields supplied".into(),
            ));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(ServiceError::db_error)?;
        self.audit
            .record(
                ctx,
                AuditEntry::new("UPDATE", "tills", Some(id))
                    .before(&current)
                    .after(&updated),
            )
            .await;
        Ok(updated)
    }
}

pub(crate) async fn find_till<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<till::Model, ServiceError> {
    till::Entity::find_by_id(id)
        .filter(till::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("till {id} not found")))
}
