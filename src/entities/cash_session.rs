use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashSessionStatus {
    #[sea_orm(string_value = "OPEN")]
    Open,
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

/// One opening-to-closing span of a till, held by one operator.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "cash_sessions")]
#[schema(as = CashSession)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub till_id: Uuid,
    pub operator_id: Uuid,
    pub status: CashSessionStatus,
    pub opening_amount: Decimal,
    pub opening_note: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// opening + signed movements, set at close
    pub system_amount: Option<Decimal>,
    /// Operator's physical count, set at close
    pub informed_amount: Option<Decimal>,
    /// informed - system, set at close
    pub discrepancy: Option<Decimal>,
    pub closing_note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::till::Entity",
        from = "Column::TillId",
        to = "super::till::Column::Id"
    )]
    Till,
    #[sea_orm(has_many = "super::cash_movement::Entity")]
    Movements,
}

impl Related<super::till::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Till.def()
    }
}

impl Related<super::cash_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_open(&self) -> bool {
        self.status == CashSessionStatus::Open
    }
}
