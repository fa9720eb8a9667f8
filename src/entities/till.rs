use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A physical or virtual cash register.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "tills")]
#[schema(as = Till)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub name: String,
    /// Account credited by withdrawals that name no destination
    pub bank_account_id: Option<Uuid>,
    /// Largest single withdrawal allowed; none or zero means unlimited
    pub withdrawal_limit: Option<Decimal>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cash_session::Entity")]
    Sessions,
}

impl Related<super::cash_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn withdrawal_cap(&self) -> Option<Decimal> {
        self.withdrawal_limit.filter(|limit| *limit > Decimal::ZERO)
    }
}
