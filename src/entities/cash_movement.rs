use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{FlowDirection, PaymentMethod};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashMovementKind {
    /// Cash brought into the till without a sale
    #[sea_orm(string_value = "SUPPLY")]
    Supply,
    /// Cash taken out of the till
    #[sea_orm(string_value = "WITHDRAWAL")]
    Withdrawal,
    #[sea_orm(string_value = "SALE")]
    Sale,
}

/// Immutable posting against a cash session.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "cash_movements")]
#[schema(as = CashMovement)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: Uuid,
    pub kind: CashMovementKind,
    pub direction: FlowDirection,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub note: Option<String>,
    /// External reference such as a sale number
    pub reference: Option<String>,
    pub destination_bank_account_id: Option<Uuid>,
    pub operator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cash_session::Entity",
        from = "Column::SessionId",
        to = "super::cash_session::Column::Id"
    )]
    Session,
}

impl Related<super::cash_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}
