use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::FlowDirection;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementReason {
    #[sea_orm(string_value = "INVENTORY_ADJUSTMENT")]
    InventoryAdjustment,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementOrigin {
    #[sea_orm(string_value = "INVENTORY_COUNT_LINE")]
    InventoryCountLine,
}

/// Append-only stock delta. `quantity` is a magnitude; `direction` carries the sign.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "stock_movements")]
#[schema(as = StockMovement)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub direction: FlowDirection,
    pub quantity: Decimal,
    pub reason: StockMovementReason,
    pub origin_type: StockMovementOrigin,
    pub origin_id: Uuid,
    pub trace_tag: String,
    pub unit_cost: Option<Decimal>,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn signed_quantity(&self) -> Decimal {
        self.direction.signed(self.quantity)
    }
}
