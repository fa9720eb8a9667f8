use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which side of the books a document sits on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    #[sea_orm(string_value = "RECEIVABLE")]
    Receivable,
    #[sea_orm(string_value = "PAYABLE")]
    Payable,
}

impl LedgerKind {
    /// Sequence type used when the caller does not supply a document number.
    pub fn sequence_type(self) -> &'static str {
        match self {
            LedgerKind::Receivable => "RECEIVABLE",
            LedgerKind::Payable => "PAYABLE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LedgerKind::Receivable => "receivable",
            LedgerKind::Payable => "payable",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            LedgerKind::Receivable => "receivables",
            LedgerKind::Payable => "payables",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[sea_orm(string_value = "OPEN")]
    Open,
    #[sea_orm(string_value = "SETTLED")]
    Settled,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    #[sea_orm(string_value = "TRADE_BILL")]
    TradeBill,
    #[sea_orm(string_value = "BANK_SLIP")]
    BankSlip,
    #[sea_orm(string_value = "CHECK")]
    Check,
    #[sea_orm(string_value = "CARD")]
    Card,
    #[sea_orm(string_value = "PIX")]
    Pix,
    #[sea_orm(string_value = "INVOICE")]
    Invoice,
    #[sea_orm(string_value = "BILL")]
    Bill,
    #[sea_orm(string_value = "RECEIPT")]
    Receipt,
    #[sea_orm(string_value = "OTHER")]
    Other,
}

impl DocumentType {
    /// Whether this type may be used for documents of `kind`.
    pub fn allowed_for(self, kind: LedgerKind) -> bool {
        use DocumentType::*;
        match kind {
            LedgerKind::Receivable => matches!(self, TradeBill | BankSlip | Check | Card | Pix | Other),
            LedgerKind::Payable => {
                matches!(self, TradeBill | BankSlip | Invoice | Bill | Receipt | Other)
            }
        }
    }
}

/// Expense category, payables only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayableCategory {
    #[sea_orm(string_value = "MERCHANDISE")]
    Merchandise,
    #[sea_orm(string_value = "SERVICE")]
    Service,
    #[sea_orm(string_value = "FIXED_EXPENSE")]
    FixedExpense,
    #[sea_orm(string_value = "VARIABLE_EXPENSE")]
    VariableExpense,
    #[sea_orm(string_value = "TAX")]
    Tax,
    #[sea_orm(string_value = "OTHER")]
    Other,
}

/// A receivable or payable with a running balance.
///
/// `balance`, `amount_settled`, `credit_amount` and `status` are written only by
/// the settlement engine.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "ledger_documents")]
#[schema(as = LedgerDocument)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub kind: LedgerKind,
    pub document_number: String,
    pub document_type: DocumentType,
    pub category: Option<PayableCategory>,
    /// Customer for receivables, supplier for payables
    pub counterparty_id: Uuid,
    pub description: Option<String>,
    pub installment: Option<i32>,
    pub installment_count: Option<i32>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub original_amount: Decimal,
    pub interest_amount: Decimal,
    pub penalty_amount: Decimal,
    pub discount_amount: Decimal,
    /// original + interest + penalty - discount, fixed at creation
    pub total_amount: Decimal,
    pub balance: Decimal,
    /// Sum of applied amounts across postings
    pub amount_settled: Decimal,
    /// Sum of overpayment excess across postings
    pub credit_amount: Decimal,
    pub status: DocumentStatus,
    /// Default account for bank entries when a posting names none
    pub bank_account_id: Option<Uuid>,
    pub settled_at: Option<NaiveDate>,
    pub cancel_reason: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; updates compare against the value they read
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_posting::Entity")]
    Postings,
}

impl Related<super::ledger_posting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Postings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_open(&self) -> bool {
        self.status == DocumentStatus::Open
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.due_date < today
    }
}
