use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Immutable record of one settlement applied to a ledger document.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "ledger_postings")]
#[schema(as = LedgerPosting)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    /// Amount the caller asked to apply
    pub requested_amount: Decimal,
    /// Portion that reduced the balance
    pub applied_amount: Decimal,
    /// Overpayment kept as credit on the document
    pub excess_amount: Decimal,
    pub interest_amount: Decimal,
    pub penalty_amount: Decimal,
    pub discount_amount: Decimal,
    /// requested + interest + penalty - discount; what moved through the bank
    pub net_amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub effective_date: NaiveDate,
    pub bank_account_id: Option<Uuid>,
    pub operator_id: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ledger_document::Entity",
        from = "Column::DocumentId",
        to = "super::ledger_document::Column::Id"
    )]
    Document,
    #[sea_orm(has_many = "super::posting_breakdown::Entity")]
    Breakdown,
}

impl Related<super::ledger_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl Related<super::posting_breakdown::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Breakdown.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
