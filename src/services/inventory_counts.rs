use crate::{
    context::RequestContext,
    db::{fetch_page, DbPool, FilterBuilder, Page, PageWindow},
    entities::{
        inventory_count::{self, CountStatus, CountType},
        inventory_count_line, product, stock_level, stock_location,
        stock_movement::{self, StockMovementOrigin, StockMovementReason},
        FlowDirection,
    },
    errors::ServiceError,
    services::{
        audit::{AuditEntry, AuditService},
        numbering::{NumberingService, SequenceKey},
        require_text,
    },
};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    Iterable, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

pub const SEQUENCE_TYPE: &str = "INVENTORY_COUNT";

const LINE_INSERT_CHUNK: usize = 500;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateInventoryCount {
    pub location_id: Uuid,
    pub count_type: CountType,
    /// Defaults to the caller
    pub responsible_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Which products a snapshot covers.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerateLines {
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub only_in_stock: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RecordCount {
    pub product_id: Uuid,
    pub counted_quantity: Decimal,
    #[validate(length(max = 64))]
    pub lot: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl RecordCount {
    fn check(&self) -> Result<(), ServiceError> {
        if self.counted_quantity.is_sign_negative() && !self.counted_quantity.is_zero() {
            return Err(ServiceError::ValidationError(
                "counted_quantity must not be negative".into(),
            ));
        }
        if self.counted_quantity.round_dp(4) != self.counted_quantity {
            return Err(ServiceError::ValidationError(
                "counted_quantity must have at most 4 decimal places".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RecordCounts {
    #[validate(length(min = 1, max = 500))]
    pub items: Vec<RecordCount>,
}

impl RecordCounts {
    fn check(&self) -> Result<(), ServiceError> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            item.validate()?;
            item.check()?;
            if !seen.insert(item.product_id) {
                return Err(ServiceError::ValidationError(format!(
                    "product {} appears more than once",
                    item.product_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CancelCount {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LineState {
    Pending,
    Counted,
    Divergent,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LineFilters {
    pub state: Option<LineState>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CountFilters {
    pub status: Option<CountStatus>,
    pub location_id: Option<Uuid>,
    pub count_type: Option<CountType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CountStats {
    pub total_lines: u64,
    pub counted_lines: u64,
    pub pending_lines: u64,
    pub divergent_lines: u64,
    /// Σ (counted − system) × unit cost over counted lines
    pub divergence_value: Decimal,
}

pub fn count_stats(lines: &[inventory_count_line::Model]) -> CountStats {
    lines.iter().fold(CountStats::default(), |mut stats, line| {
        stats.total_lines += 1;
        if line.counted_quantity.is_some() {
            stats.counted_lines += 1;
        } else {
            stats.pending_lines += 1;
        }
        if line.is_divergent() {
            stats.divergent_lines += 1;
        }
        stats.divergence_value += line.divergence_value();
        stats
    })
}

/// Quantity and unit cost a line snapshots for one product.
pub fn snapshot_for(
    product: &product::Model,
    level: Option<&stock_level::Model>,
) -> (Decimal, Decimal) {
    let quantity = level.map(|l| l.quantity).unwrap_or_default();
    let unit_cost = level
        .and_then(|l| l.average_cost)
        .filter(|cost| *cost > Decimal::ZERO)
        .unwrap_or(product.cost_price);
    (quantity, unit_cost)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountDetail {
    pub count: inventory_count::Model,
    pub stats: CountStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratedLines {
    pub count: inventory_count::Model,
    pub lines_generated: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdjustmentResult {
    pub count: inventory_count::Model,
    pub movements: Vec<stock_movement::Model>,
    pub divergence_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusTotal {
    pub status: CountStatus,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryCountSummary {
    pub by_status: Vec<StatusTotal>,
    pub in_progress: u64,
    pub finalized_pending_adjustment: u64,
}

/// Runs physical stock counts from snapshot to stock adjustment.
#[derive(Clone)]
pub struct InventoryCountService {
    db: Arc<DbPool>,
    numbering: NumberingService,
    audit: AuditService,
}

impl InventoryCountService {
    pub fn new(db: Arc<DbPool>, numbering: NumberingService, audit: AuditService) -> Self {
        Self {
            db,
            numbering,
            audit,
        }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, location_id = %input.location_id))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateInventoryCount,
    ) -> Result<inventory_count::Model, ServiceError> {
        input.validate()?;

        let location = stock_location::Entity::find_by_id(input.location_id)
            .filter(stock_location::Column::TenantId.eq(ctx.tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("stock location {} not found", input.location_id))
            })?;
        if !location.active {
            return Err(ServiceError::InvalidState(format!(
                "stock location {} is inactive",
                location.name
            )));
        }

        let sequence = SequenceKey::new(ctx.tenant_id, SEQUENCE_TYPE, ctx.branch_id)?;
        let numbering = self.numbering.clone();
        let (tenant_id, user_id) = (ctx.tenant_id, ctx.user_id);
        let branch_id = location.branch_id.or(ctx.branch_id);

        let count = self
            .db
            .transaction::<_, inventory_count::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let busy = inventory_count::Entity::find()
                        .filter(inventory_count::Column::TenantId.eq(tenant_id))
                        .filter(inventory_count::Column::LocationId.eq(location.id))
                        .filter(
                            inventory_count::Column::Status
                                .is_in([CountStatus::Draft, CountStatus::Counting]),
                        )
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if let Some(busy) = busy {
                        return Err(ServiceError::Conflict(format!(
                            "count {} is already in progress at location {}",
                            busy.number, location.name
                        )));
                    }

                    let number = numbering.allocate(txn, &sequence).await?.formatted;
                    let now = Utc::now();
                    inventory_count::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        branch_id: Set(branch_id),
                        number: Set(number),
                        location_id: Set(location.id),
                        count_type: Set(input.count_type),
                        status: Set(CountStatus::Draft),
                        responsible_id: Set(input.responsible_id.unwrap_or(user_id)),
                        description: Set(input.description),
                        started_at: Set(None),
                        finalized_at: Set(None),
                        adjusted_at: Set(None),
                        canceled_at: Set(None),
                        cancel_reason: Set(None),
                        created_by: Set(user_id),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(|e| {
                        ServiceError::from_write(e, || {
                            "another count is already in progress at this location".to_string()
                        })
                    })
                })
            })
            .await?;

        info!(count_id = %count.id, number = %count.number, "Inventory count created");
        self.audit
            .record(
                ctx,
                AuditEntry::new("CREATE", "inventory_counts", Some(count.id)).after(&count),
            )
            .await;
        Ok(count)
    }

    /// Replaces the count's snapshot with the products matching `filters`.
    #[instrument(skip(self, ctx, filters), fields(tenant_id = %ctx.tenant_id, count_id = %id))]
    pub async fn generate_lines(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        filters: GenerateLines,
    ) -> Result<GeneratedLines, ServiceError> {
        let tenant_id = ctx.tenant_id;

        let generated = self
            .db
            .transaction::<_, GeneratedLines, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count(txn, tenant_id, id).await?;
                    ensure_status(&count, &[CountStatus::Draft], "generate lines for")?;

                    inventory_count_line::Entity::delete_many()
                        .filter(inventory_count_line::Column::CountId.eq(count.id))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let products = product::Entity::find()
                        .filter(
                            FilterBuilder::new()
                                .eq(product::Column::TenantId, tenant_id)
                                .eq(product::Column::Active, true)
                                .eq_opt(product::Column::CategoryId, filters.category_id)
                                .eq_opt(product::Column::BrandId, filters.brand_id)
                                .build(),
                        )
                        .order_by_asc(product::Column::Sku)
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let levels: HashMap<Uuid, stock_level::Model> = stock_level::Entity::find()
                        .filter(stock_level::Column::TenantId.eq(tenant_id))
                        .filter(stock_level::Column::LocationId.eq(count.location_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .into_iter()
                        .map(|level| (level.product_id, level))
                        .collect();

                    let now = Utc::now();
                    let lines: Vec<inventory_count_line::ActiveModel> = products
                        .iter()
                        .filter_map(|product| {
                            let (quantity, unit_cost) =
                                snapshot_for(product, levels.get(&product.id));
                            if filters.only_in_stock && quantity <= Decimal::ZERO {
                                return None;
                            }
                            Some(inventory_count_line::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                count_id: Set(count.id),
                                product_id: Set(product.id),
                                system_quantity: Set(quantity),
                                unit_cost: Set(unit_cost),
                                counted_quantity: Set(None),
                                difference: Set(None),
                                lot: Set(None),
                                expiry_date: Set(None),
                                note: Set(None),
                                counted_by: Set(None),
                                counted_at: Set(None),
                                adjusted: Set(false),
                                adjusted_at: Set(None),
                                created_at: Set(now),
                            })
                        })
                        .collect();

                    let lines_generated = lines.len() as u64;
                    for chunk in lines.chunks(LINE_INSERT_CHUNK) {
                        inventory_count_line::Entity::insert_many(chunk.to_vec())
                            .exec_without_returning(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                    }

                    let mut active: inventory_count::ActiveModel = count.into();
                    active.updated_at = Set(now);
                    let count = active.update(txn).await.map_err(ServiceError::db_error)?;

                    Ok(GeneratedLines {
                        count,
                        lines_generated,
                    })
                })
            })
            .await?;

        info!(lines = generated.lines_generated, "Inventory count lines generated");
        self.audit
            .record(
                ctx,
                AuditEntry::new("GENERATE_LINES", "inventory_counts", Some(id))
                    .after(&json!({ "lines_generated": generated.lines_generated })),
            )
            .await;
        Ok(generated)
    }

    pub async fn start(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<inventory_count::Model, ServiceError> {
        let tenant_id = ctx.tenant_id;

        let count = self
            .db
            .transaction::<_, inventory_count::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count(txn, tenant_id, id).await?;
                    ensure_status(&count, &[CountStatus::Draft], "start")?;

                    let lines = inventory_count_line::Entity::find()
                        .filter(inventory_count_line::Column::CountId.eq(count.id))
                        .count(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if lines == 0 {
                        return Err(ServiceError::Precondition(
                            "count has no lines; generate lines first".into(),
                        ));
                    }

                    let now = Utc::now();
                    let mut active: inventory_count::ActiveModel = count.into();
                    active.status = Set(CountStatus::Counting);
                    active.started_at = Set(Some(now));
                    active.updated_at = Set(now);
                    transition(txn, id, active, CountStatus::Draft).await
                })
            })
            .await?;

        info!(count_id = %count.id, "Inventory count started");
        self.record_transition(ctx, &count, "START").await;
        Ok(count)
    }

    pub async fn record_count(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        input: RecordCount,
    ) -> Result<inventory_count_line::Model, ServiceError> {
        let mut lines = self
            .record_counts(ctx, id, RecordCounts { items: vec![input] })
            .await?;
        lines
            .pop()
            .ok_or_else(|| ServiceError::InternalError("count was not recorded".into()))
    }

    /// Records every item or none of them.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, count_id = %id, items = input.items.len()))]
    pub async fn record_counts(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        input: RecordCounts,
    ) -> Result<Vec<inventory_count_line::Model>, ServiceError> {
        input.validate()?;
        input.check()?;
        let (tenant_id, user_id) = (ctx.tenant_id, ctx.user_id);

        let lines = self
            .db
            .transaction::<_, Vec<inventory_count_line::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count(txn, tenant_id, id).await?;
                    ensure_status(&count, &[CountStatus::Counting], "record counts for")?;

                    let now = Utc::now();
                    let mut saved = Vec::with_capacity(input.items.len());
                    for item in input.items {
                        let line = inventory_count_line::Entity::find()
                            .filter(inventory_count_line::Column::CountId.eq(count.id))
                            .filter(inventory_count_line::Column::ProductId.eq(item.product_id))
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "product {} is not part of count {}",
                                    item.product_id, count.number
                                ))
                            })?;

                        let difference = item.counted_quantity - line.system_quantity;
                        let mut active: inventory_count_line::ActiveModel = line.into();
                        active.counted_quantity = Set(Some(item.counted_quantity));
                        active.difference = Set(Some(difference));
                        active.lot = Set(item.lot);
                        active.expiry_date = Set(item.expiry_date);
                        active.note = Set(item.note);
                        active.counted_by = Set(Some(user_id));
                        active.counted_at = Set(Some(now));
                        saved.push(active.update(txn).await.map_err(ServiceError::db_error)?);
                    }
                    Ok(saved)
                })
            })
            .await?;

        info!(recorded = lines.len(), "Inventory counts recorded");
        self.audit
            .record(
                ctx,
                AuditEntry::new("RECORD_COUNT", "inventory_count_lines", Some(id)).after(&lines),
            )
            .await;
        Ok(lines)
    }

    pub async fn finalize(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<inventory_count::Model, ServiceError> {
        let tenant_id = ctx.tenant_id;

        let count = self
            .db
            .transaction::<_, inventory_count::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count(txn, tenant_id, id).await?;
                    ensure_status(&count, &[CountStatus::Counting], "finalize")?;

                    let pending = inventory_count_line::Entity::find()
                        .filter(inventory_count_line::Column::CountId.eq(count.id))
                        .filter(inventory_count_line::Column::CountedQuantity.is_null())
                        .count(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if pending > 0 {
                        return Err(ServiceError::Precondition(format!(
                            "{pending} items have no count"
                        )));
                    }

                    let now = Utc::now();
                    let mut active: inventory_count::ActiveModel = count.into();
                    active.status = Set(CountStatus::Finalized);
                    active.finalized_at = Set(Some(now));
                    active.updated_at = Set(now);
                    transition(txn, id, active, CountStatus::Counting).await
                })
            })
            .await?;

        info!(count_id = %count.id, "Inventory count finalized");
        self.record_transition(ctx, &count, "FINALIZE").await;
        Ok(count)
    }

    /// Books one stock movement per unadjusted divergent line and sets the
    /// live quantity to the counted one.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, count_id = %id))]
    pub async fn adjust_stock(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<AdjustmentResult, ServiceError> {
        let (tenant_id, user_id) = (ctx.tenant_id, ctx.user_id);

        let result = self
            .db
            .transaction::<_, AdjustmentResult, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count(txn, tenant_id, id).await?;
                    ensure_status(&count, &[CountStatus::Finalized], "adjust stock for")?;

                    let divergent: Vec<_> = inventory_count_line::Entity::find()
                        .filter(inventory_count_line::Column::CountId.eq(count.id))
                        .filter(inventory_count_line::Column::Adjusted.eq(false))
                        .order_by_asc(inventory_count_line::Column::CreatedAt)
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .into_iter()
                        .filter(|line| line.is_divergent())
                        .collect();
                    if divergent.is_empty() {
                        return Err(ServiceError::Precondition("nothing to adjust".into()));
                    }

                    let now = Utc::now();
                    let mut movements = Vec::with_capacity(divergent.len());
                    let mut divergence_value = Decimal::ZERO;
                    for line in divergent {
                        let (Some(counted), Some(difference)) =
                            (line.counted_quantity, line.divergence())
                        else {
                            continue;
                        };
                        divergence_value += line.divergence_value();

                        let quantity_before =
                            set_stock_level(txn, tenant_id, &count, &line, counted).await?;
                        let direction = if difference > Decimal::ZERO {
                            FlowDirection::In
                        } else {
                            FlowDirection::Out
                        };

                        let movement = stock_movement::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            product_id: Set(line.product_id),
                            location_id: Set(count.location_id),
                            direction: Set(direction),
                            quantity: Set(difference.abs()),
                            reason: Set(StockMovementReason::InventoryAdjustment),
                            origin_type: Set(StockMovementOrigin::InventoryCountLine),
                            origin_id: Set(line.id),
                            trace_tag: Set(count.number.clone()),
                            unit_cost: Set(Some(line.unit_cost)),
                            quantity_before: Set(quantity_before),
                            quantity_after: Set(counted),
                            created_by: Set(user_id),
                            created_at: Set(now),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                        movements.push(movement);

                        let mut active: inventory_count_line::ActiveModel = line.into();
                        active.adjusted = Set(true);
                        active.adjusted_at = Set(Some(now));
                        active.update(txn).await.map_err(ServiceError::db_error)?;
                    }

                    let mut active: inventory_count::ActiveModel = count.into();
                    active.status = Set(CountStatus::Adjusted);
                    active.adjusted_at = Set(Some(now));
                    active.updated_at = Set(now);
                    let count = transition(txn, id, active, CountStatus::Finalized).await?;

                    Ok(AdjustmentResult {
                        count,
                        movements,
                        divergence_value,
                    })
                })
            })
            .await?;

        counter!(
            "planac_inventory.stock_adjustments",
            result.movements.len() as u64
        );
        info!(
            movements = result.movements.len(),
            divergence_value = %result.divergence_value,
            "Stock adjusted from inventory count"
        );
        self.audit
            .record(
                ctx,
                AuditEntry::new("ADJUST_STOCK", "inventory_counts", Some(id)).after(&json!({
                    "status": result.count.status,
                    "movements": result.movements.len(),
                    "divergence_value": result.divergence_value,
                })),
            )
            .await;
        Ok(result)
    }

    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        input: CancelCount,
    ) -> Result<inventory_count::Model, ServiceError> {
        input.validate()?;
        require_text("reason", &input.reason)?;
        let tenant_id = ctx.tenant_id;
        let reason = input.reason.trim().to_string();

        let count = self
            .db
            .transaction::<_, inventory_count::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count(txn, tenant_id, id).await?;
                    ensure_status(&count, &[CountStatus::Draft, CountStatus::Counting], "cancel")?;
                    let from = count.status;

                    let now = Utc::now();
                    let mut active: inventory_count::ActiveModel = count.into();
                    active.status = Set(CountStatus::Canceled);
                    active.canceled_at = Set(Some(now));
                    active.cancel_reason = Set(Some(reason));
                    active.updated_at = Set(now);
                    transition(txn, id, active, from).await
                })
            })
            .await?;

        info!(count_id = %count.id, "Inventory count canceled");
        self.record_transition(ctx, &count, "CANCEL").await;
        Ok(count)
    }

    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<CountDetail, ServiceError> {
        let db = self.db.as_ref();
        let count = find_count(db, ctx.tenant_id, id).await?;
        let lines = inventory_count_line::Entity::find()
            .filter(inventory_count_line::Column::CountId.eq(count.id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(CountDetail {
            stats: count_stats(&lines),
            count,
        })
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filters: &CountFilters,
        window: PageWindow,
    ) -> Result<Page<inventory_count::Model>, ServiceError> {
        use inventory_count::Column;

        let condition = FilterBuilder::new()
            .eq(Column::TenantId, ctx.tenant_id)
            .eq_opt(Column::Status, filters.status)
            .eq_opt(Column::LocationId, filters.location_id)
            .eq_opt(Column::CountType, filters.count_type)
            .build();

        fetch_page::<inventory_count::Entity, _, _>(
            self.db.as_ref(),
            condition,
            |q| q.order_by_desc(Column::CreatedAt),
            window,
        )
        .await
        .map_err(ServiceError::db_error)
    }

    pub async fn list_lines(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        filters: &LineFilters,
        window: PageWindow,
    ) -> Result<Page<inventory_count_line::Model>, ServiceError> {
        use inventory_count_line::Column;

        let db = self.db.as_ref();
        let count = find_count(db, ctx.tenant_id, id).await?;

        let mut condition = FilterBuilder::new().eq(Column::CountId, count.id);
        condition = match filters.state {
            Some(LineState::Pending) => condition.add(Column::CountedQuantity.is_null()),
            Some(LineState::Counted) => condition.add(Column::CountedQuantity.is_not_null()),
            Some(LineState::Divergent) => condition.add(
                Condition::all()
                    .add(Column::Difference.is_not_null())
                    .add(Column::Difference.ne(Decimal::ZERO)),
            ),
            None => condition,
        };

        fetch_page::<inventory_count_line::Entity, _, _>(
            db,
            condition.build(),
            |q| q.order_by_asc(Column::CreatedAt).order_by_asc(Column::Id),
            window,
        )
        .await
        .map_err(ServiceError::db_error)
    }

    pub async fn summary(&self, ctx: &RequestContext) -> Result<InventoryCountSummary, ServiceError> {
        let db = self.db.as_ref();

        let mut by_status = Vec::new();
        for status in CountStatus::iter() {
            let count = inventory_count::Entity::find()
                .filter(inventory_count::Column::TenantId.eq(ctx.tenant_id))
                .filter(inventory_count::Column::Status.eq(status))
                .count(db)
                .await
                .map_err(ServiceError::db_error)?;
            by_status.push(StatusTotal { status, count });
        }
        let in_progress = by_status
            .iter()
            .filter(|total| total.status.is_active())
            .map(|total| total.count)
            .sum();

        let finalized: Vec<Uuid> = inventory_count::Entity::find()
            .filter(inventory_count::Column::TenantId.eq(ctx.tenant_id))
            .filter(inventory_count::Column::Status.eq(CountStatus::Finalized))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|count| count.id)
            .collect();

        let finalized_pending_adjustment = if finalized.is_empty() {
            0
        } else {
            inventory_count_line::Entity::find()
                .filter(inventory_count_line::Column::CountId.is_in(finalized))
                .filter(inventory_count_line::Column::Adjusted.eq(false))
                .filter(inventory_count_line::Column::Difference.ne(Decimal::ZERO))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|line| line.count_id)
                .collect::<HashSet<_>>()
                .len() as u64
        };

        Ok(InventoryCountSummary {
            by_status,
            in_progress,
            finalized_pending_adjustment,
        })
    }

    async fn record_transition(
        &self,
        ctx: &RequestContext,
        count: &inventory_count::Model,
        action: &str,
    ) {
        self.audit
            .record(
                ctx,
                AuditEntry::new(action, "inventory_counts", Some(count.id)).after(&count),
            )
            .await;
    }
}

async fn find_count<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<inventory_count::Model, ServiceError> {
    inventory_count::Entity::find_by_id(id)
        .filter(inventory_count::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("inventory count {id} not found")))
}

fn ensure_status(
    count: &inventory_count::Model,
    allowed: &[CountStatus],
    action: &str,
) -> Result<(), ServiceError> {
    if allowed.contains(&count.status) {
        return Ok(());
    }
    Err(ServiceError::InvalidState(format!(
        "cannot {action} count {} in status {}",
        count.number,
        sea_orm::ActiveEnum::to_value(&count.status)
    )))
}

/// Writes `active` only if the row still has status `from`.
async fn transition(
    txn: &DatabaseTransaction,
    id: Uuid,
    active: inventory_count::ActiveModel,
    from: CountStatus,
) -> Result<inventory_count::Model, ServiceError> {
    let result = inventory_count::Entity::update_many()
        .set(active)
        .filter(inventory_count::Column::Id.eq(id))
        .filter(inventory_count::Column::Status.eq(from))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected != 1 {
        return Err(ServiceError::Conflict(
            "inventory count was modified concurrently".into(),
        ));
    }

    inventory_count::Entity::find_by_id(id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("inventory count {id} not found")))
}

/// Sets the live quantity for the line's product at the count location and
/// returns the previous quantity.
async fn set_stock_level(
    txn: &DatabaseTransaction,
    tenant_id: Uuid,
    count: &inventory_count::Model,
    line: &inventory_count_line::Model,
    counted: Decimal,
) -> Result<Decimal, ServiceError> {
    let now = Utc::now();
    let level = stock_level::Entity::find()
        .filter(stock_level::Column::TenantId.eq(tenant_id))
        .filter(stock_level::Column::ProductId.eq(line.product_id))
        .filter(stock_level::Column::LocationId.eq(count.location_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    match level {
        Some(level) => {
            let before = level.quantity;
            let mut active: stock_level::ActiveModel = level.into();
            active.quantity = Set(counted);
            active.updated_at = Set(now);
            active.update(txn).await.map_err(ServiceError::db_error)?;
            Ok(before)
        }
        None => {
            stock_level::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                product_id: Set(line.product_id),
                location_id: Set(count.location_id),
                quantity: Set(counted),
                average_cost: Set(Some(line.unit_cost)),
                updated_at: Set(now),
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;
            Ok(Decimal::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(system: Decimal, counted: Option<Decimal>, cost: Decimal) -> inventory_count_line::Model {
        inventory_count_line::Model {
            id: Uuid::new_v4(),
            count_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            system_quantity: system,
            unit_cost: cost,
            counted_quantity: counted,
            difference: counted.map(|c| c - system),
            lot: None,
            expiry_date: None,
            note: None,
            counted_by: None,
            counted_at: None,
            adjusted: false,
            adjusted_at: None,
            created_at: Utc::now(),
        }
    }

    fn product(cost_price: Decimal) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            sku: "SKU-1".into(),
            name: "Widget".into(),
            category_id: None,
            brand_id: None,
            cost_price,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stats_value_divergence_at_snapshot_cost() {
        let lines = vec![
            line(dec!(10), Some(dec!(10)), dec!(2)),
            line(dec!(5), Some(dec!(3)), dec!(4)),
            line(dec!(0), Some(dec!(2)), dec!(1.5)),
            line(dec!(7), None, dec!(9)),
        ];
        let stats = count_stats(&lines);

        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.counted_lines, 3);
        assert_eq!(stats.pending_lines, 1);
        assert_eq!(stats.divergent_lines, 2);
        // (3 - 5) * 4 + (2 - 0) * 1.5
        assert_eq!(stats.divergence_value, dec!(-5));
    }

    #[test]
    fn snapshot_falls_back_to_product_cost() {
        let product = product(dec!(12.50));
        assert_eq!(snapshot_for(&product, None), (dec!(0), dec!(12.50)));

        let level = stock_level::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            product_id: product.id,
            location_id: Uuid::new_v4(),
            quantity: dec!(8),
            average_cost: Some(dec!(11)),
            updated_at: Utc::now(),
        };
        assert_eq!(snapshot_for(&product, Some(&level)), (dec!(8), dec!(11)));

        let uncosted = stock_level::Model {
            average_cost: None,
            ..level
        };
        assert_eq!(snapshot_for(&product, Some(&uncosted)), (dec!(8), dec!(12.50)));
    }

    #[test]
    fn batch_rejects_duplicate_products() {
        let product_id = Uuid::new_v4();
        let item = RecordCount {
            product_id,
            counted_quantity: dec!(1),
            lot: None,
            expiry_date: None,
            note: None,
        };
        let batch = RecordCounts {
            items: vec![item.clone(), item],
        };
        assert!(matches!(batch.check(), Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let item = RecordCount {
            product_id: Uuid::new_v4(),
            counted_quantity: dec!(-1),
            lot: None,
            expiry_date: None,
            note: None,
        };
        assert!(matches!(item.check(), Err(ServiceError::ValidationError(_))));
    }
}
