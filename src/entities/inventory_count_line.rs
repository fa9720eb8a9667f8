use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Snapshot of one product at count start plus its counted quantity.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_count_lines")]
#[schema(as = InventoryCountLine)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub count_id: Uuid,
    pub product_id: Uuid,
    pub system_quantity: Decimal,
    pub unit_cost: Decimal,
    pub counted_quantity: Option<Decimal>,
    /// counted - system, kept alongside the count
    pub difference: Option<Decimal>,
    pub lot: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub counted_by: Option<Uuid>,
    pub counted_at: Option<DateTime<Utc>>,
    pub adjusted: bool,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_count::Entity",
        from = "Column::CountId",
        to = "super::inventory_count::Column::Id"
    )]
    Count,
}

impl Related<super::inventory_count::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Count.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn divergence(&self) -> Option<Decimal> {
        self.counted_quantity.map(|counted| counted - self.system_quantity)
    }

    pub fn is_divergent(&self) -> bool {
        self.divergence().is_some_and(|d| !d.is_zero())
    }

    /// Divergence valued at the snapshot unit cost; zero while uncounted.
    pub fn divergence_value(&self) -> Decimal {
        self.divergence().unwrap_or_default() * self.unit_cost
    }
}
