use crate::{
    context::RequestContext,
    db::{fetch_page, DbPool, FilterBuilder, Page, PageWindow},
    entities::{
        bank_ledger_entry::{self, BankEntryCategory, BankEntryOrigin, EntryDirection},
        ledger_document::{self, DocumentStatus, DocumentType, LedgerKind, PayableCategory},
        ledger_posting, posting_breakdown, PaymentMethod,
    },
    errors::ServiceError,
    services::{
        audit::{AuditEntry, AuditService},
        numbering::{NumberingService, SequenceKey},
        require_amount, require_non_negative, require_text,
    },
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const TOP_COUNTERPARTIES: usize = 5;
const DUE_SOON_DAYS: i64 = 7;
const DEFAULT_CASH_FLOW_DAYS: u32 = 30;
const MAX_CASH_FLOW_DAYS: u32 = 365;

/// Interest, penalty and discount carried by one posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingAdjustments {
    pub interest: Decimal,
    pub penalty: Decimal,
    pub discount: Decimal,
}

/// Result of applying one posting to an open balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementOutcome {
    /// Portion of the request that reduced the balance
    pub applied: Decimal,
    /// Overpayment, kept as credit on the document
    pub excess: Decimal,
    pub new_balance: Decimal,
    pub new_status: DocumentStatus,
    /// requested + interest + penalty - discount
    pub net_amount: Decimal,
}

/// Balance arithmetic for one posting. Never lets the balance go below zero;
/// whatever exceeds the balance is reported as `excess`.
pub fn compute_settlement(
    balance: Decimal,
    requested: Decimal,
    adjustments: PostingAdjustments,
) -> SettlementOutcome {
    let balance = balance.max(Decimal::ZERO);
    let applied = requested.min(balance).max(Decimal::ZERO);
    let new_balance = balance - applied;

    SettlementOutcome {
        applied,
        excess: requested - applied,
        new_balance,
        new_status: if new_balance.is_zero() {
            DocumentStatus::Settled
        } else {
            DocumentStatus::Open
        },
        net_amount: requested + adjustments.interest + adjustments.penalty
            - adjustments.discount,
    }
}

pub fn document_total(original: Decimal, adjustments: PostingAdjustments) -> Decimal {
    original + adjustments.interest + adjustments.penalty - adjustments.discount
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateDocument {
    /// Customer for receivables, supplier for payables
    pub counterparty_id: Uuid,
    /// Allocated from the document sequence when omitted
    #[validate(length(min = 1, max = 64))]
    pub document_number: Option<String>,
    pub document_type: DocumentType,
    pub category: Option<PayableCategory>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 999))]
    pub installment: Option<i32>,
    #[validate(range(min = 1, max = 999))]
    pub installment_count: Option<i32>,
    /// Defaults to today
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub original_amount: Decimal,
    #[serde(default)]
    pub interest_amount: Decimal,
    #[serde(default)]
    pub penalty_amount: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub bank_account_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl CreateDocument {
    fn adjustments(&self) -> PostingAdjustments {
        PostingAdjustments {
            interest: self.interest_amount,
            penalty: self.penalty_amount,
            discount: self.discount_amount,
        }
    }

    fn check(&self, kind: LedgerKind, today: NaiveDate) -> Result<(), ServiceError> {
        require_amount("original_amount", self.original_amount)?;
        require_non_negative("interest_amount", self.interest_amount)?;
        require_non_negative("penalty_amount", self.penalty_amount)?;
        require_non_negative("discount_amount", self.discount_amount)?;
        require_amount(
            "total_amount",
            document_total(self.original_amount, self.adjustments()),
        )?;
        check_document_type(kind, self.document_type)?;
        check_category(kind, self.category)?;

        if let Some(number) = &self.document_number {
            require_text("document_number", number)?;
        }
        if self.due_date < self.issue_date.unwrap_or(today) {
            return Err(ServiceError::ValidationError(
                "due_date must not be before issue_date".into(),
            ));
        }
        match (self.installment, self.installment_count) {
            (Some(n), Some(count)) if n > count => Err(ServiceError::ValidationError(format!(
                "installment {n} exceeds installment_count {count}"
            ))),
            (Some(_), None) => Err(ServiceError::ValidationError(
                "installment requires installment_count".into(),
            )),
            _ => Ok(()),
        }
    }
}

fn check_document_type(kind: LedgerKind, document_type: DocumentType) -> Result<(), ServiceError> {
    if document_type.allowed_for(kind) {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "document_type {} is not accepted for {}s",
            document_type.to_value(),
            kind.label()
        )))
    }
}

fn check_category(
    kind: LedgerKind,
    category: Option<PayableCategory>,
) -> Result<(), ServiceError> {
    if kind == LedgerKind::Receivable && category.is_some() {
        return Err(ServiceError::ValidationError(
            "category applies to payables only".into(),
        ));
    }
    Ok(())
}

/// Allow-listed fields a caller may change on an open document.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DocumentPatch {
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub category: Option<PayableCategory>,
    pub bank_account_id: Option<Uuid>,
    pub document_type: Option<DocumentType>,
}

impl DocumentPatch {
    fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.notes.is_none()
            && self.category.is_none()
            && self.bank_account_id.is_none()
            && self.document_type.is_none()
    }

    fn check(&self, kind: LedgerKind) -> Result<(), ServiceError> {
        if self.is_empty() {
            return Err(ServiceError::ValidationError(
                "no updatable fields supplied".into(),
            ));
        }
        if let Some(document_type) = self.document_type {
            check_document_type(kind, document_type)?;
        }
        check_category(kind, self.category)
    }

    fn apply_to(self, active: &mut ledger_document::ActiveModel) {
        if let Some(description) = self.description {
            active.description = Set(Some(description));
        }
        if let Some(notes) = self.notes {
            active.notes = Set(Some(notes));
        }
        if let Some(category) = self.category {
            active.category = Set(Some(category));
        }
        if let Some(bank_account_id) = self.bank_account_id {
            active.bank_account_id = Set(Some(bank_account_id));
        }
        if let Some(document_type) = self.document_type {
            active.document_type = Set(document_type);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BreakdownLine {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ApplyPosting {
    pub applied_amount: Decimal,
    #[serde(default)]
    pub interest: Decimal,
    #[serde(default)]
    pub penalty: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    /// Tender lines; must sum to `applied_amount`
    #[validate(length(min = 1, max = 20))]
    pub breakdown: Vec<BreakdownLine>,
    /// Falls back to the document's default account
    pub bank_account_id: Option<Uuid>,
    /// Defaults to today
    pub effective_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl ApplyPosting {
    /// Single full payment in one tender.
    pub fn single(amount: Decimal, method: PaymentMethod) -> Self {
        Self {
            applied_amount: amount,
            interest: Decimal::ZERO,
            penalty: Decimal::ZERO,
            discount: Decimal::ZERO,
            breakdown: vec![BreakdownLine {
                payment_method: method,
                amount,
            }],
            bank_account_id: None,
            effective_date: None,
            note: None,
        }
    }

    fn adjustments(&self) -> PostingAdjustments {
        PostingAdjustments {
            interest: self.interest,
            penalty: self.penalty,
            discount: self.discount,
        }
    }

    fn check(&self) -> Result<(), ServiceError> {
        require_amount("applied_amount", self.applied_amount)?;
        require_non_negative("interest", self.interest)?;
        require_non_negative("penalty", self.penalty)?;
        require_non_negative("discount", self.discount)?;

        let mut sum = Decimal::ZERO;
        for (i, line) in self.breakdown.iter().enumerate() {
            require_amount(&format!("breakdown[{i}].amount"), line.amount)?;
            sum += line.amount;
        }
        if sum != self.applied_amount {
            return Err(ServiceError::ValidationError(format!(
                "breakdown sums to {sum} but applied_amount is {}",
                self.applied_amount
            )));
        }
        if self.discount > self.applied_amount + self.interest + self.penalty {
            return Err(ServiceError::ValidationError(
                "discount exceeds the amount being paid".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CancelDocument {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RescheduleDocument {
    pub new_due_date: NaiveDate,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettlementResult {
    pub posting_id: Uuid,
    pub new_balance: Decimal,
    pub new_status: DocumentStatus,
    pub applied_amount: Decimal,
    pub excess_amount: Decimal,
    pub net_amount: Decimal,
    pub bank_entry_id: Option<Uuid>,
}

impl SettlementResult {
    pub fn message(&self) -> String {
        match self.new_status {
            DocumentStatus::Settled if self.excess_amount.is_zero() => "Settled clean".to_string(),
            DocumentStatus::Settled => {
                format!("Settled with a credit of {}", self.excess_amount)
            }
            _ => format!("Partially settled; balance {}", self.new_balance),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostingDetail {
    pub posting: ledger_posting::Model,
    pub breakdown: Vec<posting_breakdown::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentDetail {
    pub document: ledger_document::Model,
    pub postings: Vec<PostingDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reconciliation {
    pub document_id: Uuid,
    pub total_amount: Decimal,
    pub applied_total: Decimal,
    pub stored_balance: Decimal,
    pub recomputed_balance: Decimal,
    pub postings: u64,
    pub consistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CounterpartyBalance {
    pub counterparty_id: Uuid,
    pub open_balance: Decimal,
    pub documents: u64,
}

/// Canceled documents never contribute to these figures.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerSummary {
    pub kind: LedgerKind,
    pub open_total: Decimal,
    pub open_count: u64,
    pub overdue_total: Decimal,
    pub overdue_count: u64,
    pub due_soon_total: Decimal,
    pub due_soon_count: u64,
    pub settled_this_month: Decimal,
    pub top_counterparties: Vec<CounterpartyBalance>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentFilters {
    pub status: Option<DocumentStatus>,
    pub counterparty_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    /// Open documents past their due date
    pub overdue: Option<bool>,
    /// Substring of the document number
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CashFlowQuery {
    /// Days ahead of today to project, 30 when omitted
    pub days: Option<u32>,
}

/// Open balances falling due on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CashFlowDay {
    pub date: NaiveDate,
    pub receivable: Decimal,
    pub payable: Decimal,
    pub net: Decimal,
}

/// Open receivables and payables due between `from` and `to`, both inclusive.
/// Overdue documents are left out.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CashFlowProjection {
    pub days: u32,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub receivable_total: Decimal,
    pub payable_total: Decimal,
    pub net: Decimal,
    pub by_date: Vec<CashFlowDay>,
}

/// Groups open balances by due date and ledger kind. Documents that are not
/// OPEN or fall outside `from..=to` are ignored.
pub fn project_cash_flow(
    documents: &[ledger_document::Model],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<CashFlowDay> {
    let mut by_date: BTreeMap<NaiveDate, CashFlowDay> = BTreeMap::new();
    for document in documents {
        if !document.is_open() || document.due_date < from || document.due_date > to {
            continue;
        }
        let day = by_date
            .entry(document.due_date)
            .or_insert_with(|| CashFlowDay {
                date: document.due_date,
                receivable: Decimal::ZERO,
                payable: Decimal::ZERO,
                net: Decimal::ZERO,
            });
        match document.kind {
            LedgerKind::Receivable => day.receivable += document.balance,
            LedgerKind::Payable => day.payable += document.balance,
        }
        day.net = day.receivable - day.payable;
    }
    by_date.into_values().collect()
}

/// Sole writer of ledger document balances and statuses.
#[derive(Clone)]
pub struct SettlementService {
    db: Arc<DbPool>,
    numbering: NumberingService,
    audit: AuditService,
}

impl SettlementService {
    pub fn new(db: Arc<DbPool>, numbering: NumberingService, audit: AuditService) -> Self {
        Self {
            db,
            numbering,
            audit,
        }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, kind = kind.label()))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        input: CreateDocument,
    ) -> Result<ledger_document::Model, ServiceError> {
        input.validate()?;
        let today = Utc::now().date_naive();
        input.check(kind, today)?;

        let sequence = SequenceKey::new(ctx.tenant_id, kind.sequence_type(), ctx.branch_id)?;
        let numbering = self.numbering.clone();
        let (tenant_id, user_id, branch_id) = (ctx.tenant_id, ctx.user_id, ctx.branch_id);

        let document = self
            .db
            .transaction::<_, ledger_document::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let document_number = match &input.document_number {
                        Some(number) => number.trim().to_string(),
                        None => numbering.allocate(txn, &sequence).await?.formatted,
                    };
                    let total = document_total(input.original_amount, input.adjustments());
                    let now = Utc::now();

                    ledger_document::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        branch_id: Set(branch_id),
                        kind: Set(kind),
                        document_number: Set(document_number),
                        document_type: Set(input.document_type),
                        category: Set(input.category),
                        counterparty_id: Set(input.counterparty_id),
                        description: Set(input.description),
                        installment: Set(input.installment),
                        installment_count: Set(input.installment_count),
                        issue_date: Set(input.issue_date.unwrap_or(today)),
                        due_date: Set(input.due_date),
                        original_amount: Set(input.original_amount),
                        interest_amount: Set(input.interest_amount),
                        penalty_amount: Set(input.penalty_amount),
                        discount_amount: Set(input.discount_amount),
                        total_amount: Set(total),
                        balance: Set(total),
                        amount_settled: Set(Decimal::ZERO),
                        credit_amount: Set(Decimal::ZERO),
                        status: Set(DocumentStatus::Open),
                        bank_account_id: Set(input.bank_account_id),
                        settled_at: Set(None),
                        cancel_reason: Set(None),
                        canceled_at: Set(None),
                        notes: Set(input.notes),
                        created_by: Set(user_id),
                        created_at: Set(now),
                        updated_at: Set(now),
                        version: Set(1),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)
                })
            })
            .await?;

        info!(
            document_id = %document.id,
            document_number = %document.document_number,
            total = %document.total_amount,
            "Ledger document created"
        );
        self.audit
            .record(
                ctx,
                AuditEntry::new("CREATE", kind.table_name(), Some(document.id)).after(&document),
            )
            .await;

        Ok(document)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        id: Uuid,
    ) -> Result<DocumentDetail, ServiceError> {
        let db = self.db.as_ref();
        let document = find_document(db, ctx.tenant_id, kind, id).await?;
        let postings = load_postings(db, id).await?;

        let ids: Vec<Uuid> = postings.iter().map(|p| p.id).collect();
        let mut lines: HashMap<Uuid, Vec<posting_breakdown::Model>> = HashMap::new();
        if !ids.is_empty() {
            for line in posting_breakdown::Entity::find()
                .filter(posting_breakdown::Column::PostingId.is_in(ids))
                .order_by_asc(posting_breakdown::Column::Position)
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
            {
                lines.entry(line.posting_id).or_default().push(line);
            }
        }

        Ok(DocumentDetail {
            document,
            postings: postings
                .into_iter()
                .map(|posting| PostingDetail {
                    breakdown: lines.remove(&posting.id).unwrap_or_default(),
                    posting,
                })
                .collect(),
        })
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        filters: &DocumentFilters,
        window: PageWindow,
    ) -> Result<Page<ledger_document::Model>, ServiceError> {
        use ledger_document::Column;

        let today = Utc::now().date_naive();
        let condition = FilterBuilder::new()
            .eq(Column::TenantId, ctx.tenant_id)
            .eq(Column::Kind, kind)
            .eq_opt(Column::Status, filters.status)
            .eq_opt(Column::CounterpartyId, filters.counterparty_id)
            .eq_opt(Column::BranchId, filters.branch_id)
            .gte_opt(Column::DueDate, filters.due_from)
            .lte_opt(Column::DueDate, filters.due_to)
            .add_if(filters.overdue == Some(true), || {
                Column::Status
                    .eq(DocumentStatus::Open)
                    .and(Column::DueDate.lt(today))
            })
            .contains_opt(Column::DocumentNumber, filters.search.as_deref())
            .build();

        fetch_page::<ledger_document::Entity, _, _>(
            self.db.as_ref(),
            condition,
            |q| {
                q.order_by_asc(Column::DueDate)
                    .order_by_asc(Column::CreatedAt)
            },
            window,
        )
        .await
        .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id, document_id = %id))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        id: Uuid,
        patch: DocumentPatch,
    ) -> Result<ledger_document::Model, ServiceError> {
        patch.validate()?;
        patch.check(kind)?;
        let tenant_id = ctx.tenant_id;

        let (before, after) = self
            .db
            .transaction::<_, (ledger_document::Model, ledger_document::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let document = find_document(txn, tenant_id, kind, id).await?;
                    ensure_open(&document, "update")?;

                    let mut active: ledger_document::ActiveModel = document.clone().into();
                    patch.apply_to(&mut active);
                    let updated = save_document(txn, &document, active).await?;
                    Ok((document, updated))
                })
            })
            .await?;

        info!("Ledger document updated");
        self.audit
            .record(
                ctx,
                AuditEntry::new("UPDATE", kind.table_name(), Some(id))
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// Applies one posting: inserts the posting and its breakdown, moves the
    /// balance and status, and books the bank entry, all in one transaction.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, document_id = %id))]
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        id: Uuid,
        input: ApplyPosting,
    ) -> Result<SettlementResult, ServiceError> {
        input.validate()?;
        input.check()?;
        let (tenant_id, operator_id) = (ctx.tenant_id, ctx.user_id);

        let (result, before) = self
            .db
            .transaction::<_, (SettlementResult, ledger_document::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let document = find_document(txn, tenant_id, kind, id).await?;
                    ensure_open(&document, "settle")?;

                    let outcome =
                        compute_settlement(document.balance, input.applied_amount, input.adjustments());
                    let now = Utc::now();
                    let effective_date = input.effective_date.unwrap_or_else(|| now.date_naive());
                    let bank_account_id = input.bank_account_id.or(document.bank_account_id);

                    let posting = ledger_posting::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        document_id: Set(document.id),
                        requested_amount: Set(input.applied_amount),
                        applied_amount: Set(outcome.applied),
                        excess_amount: Set(outcome.excess),
                        interest_amount: Set(input.interest),
                        penalty_amount: Set(input.penalty),
                        discount_amount: Set(input.discount),
                        net_amount: Set(outcome.net_amount),
                        balance_before: Set(document.balance),
                        balance_after: Set(outcome.new_balance),
                        effective_date: Set(effective_date),
                        bank_account_id: Set(bank_account_id),
                        operator_id: Set(operator_id),
                        note: Set(input.note.clone()),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    let lines = input.breakdown.iter().enumerate().map(|(position, line)| {
                        posting_breakdown::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            posting_id: Set(posting.id),
                            position: Set(position as i32),
                            payment_method: Set(line.payment_method),
                            amount: Set(line.amount),
                        }
                    });
                    posting_breakdown::Entity::insert_many(lines)
                        .exec_without_returning(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let mut active: ledger_document::ActiveModel = document.clone().into();
                    active.balance = Set(outcome.new_balance);
                    active.amount_settled = Set(document.amount_settled + outcome.applied);
                    active.credit_amount = Set(document.credit_amount + outcome.excess);
                    active.status = Set(outcome.new_status);
                    if outcome.new_status == DocumentStatus::Settled {
                        active.settled_at = Set(Some(effective_date));
                    }
                    save_document(txn, &document, active).await?;

                    let bank_entry_id = match bank_account_id {
                        Some(account) if outcome.net_amount > Decimal::ZERO => Some(
                            book_bank_entry(txn, &document, &posting, account)
                                .await?
                                .id,
                        ),
                        _ => None,
                    };

                    Ok((
                        SettlementResult {
                            posting_id: posting.id,
                            new_balance: outcome.new_balance,
                            new_status: outcome.new_status,
                            applied_amount: outcome.applied,
                            excess_amount: outcome.excess,
                            net_amount: outcome.net_amount,
                            bank_entry_id,
                        },
                        document,
                    ))
                })
            })
            .await?;

        counter!("planac_settlement.applied", 1);
        info!(
            posting_id = %result.posting_id,
            applied = %result.applied_amount,
            excess = %result.excess_amount,
            balance = %result.new_balance,
            status = %result.new_status.to_value(),
            "Posting applied"
        );
        self.audit
            .record(
                ctx,
                AuditEntry::new("SETTLE", kind.table_name(), Some(id))
                    .before(&json!({
                        "balance": before.balance,
                        "status": before.status,
                    }))
                    .after(&result),
            )
            .await;

        Ok(result)
    }

    /// Terminal. Legal from OPEN only; the balance and postings stay as they are.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, document_id = %id))]
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        id: Uuid,
        input: CancelDocument,
    ) -> Result<ledger_document::Model, ServiceError> {
        input.validate()?;
        require_text("reason", &input.reason)?;
        let tenant_id = ctx.tenant_id;
        let reason = input.reason.trim().to_string();

        let (before, after) = self
            .db
            .transaction::<_, (ledger_document::Model, ledger_document::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let document = find_document(txn, tenant_id, kind, id).await?;
                    ensure_open(&document, "cancel")?;

                    let mut active: ledger_document::ActiveModel = document.clone().into();
                    active.status = Set(DocumentStatus::Canceled);
                    active.cancel_reason = Set(Some(reason));
                    active.canceled_at = Set(Some(Utc::now()));
                    let updated = save_document(txn, &document, active).await?;
                    Ok((document, updated))
                })
            })
            .await?;

        counter!("planac_settlement.canceled", 1);
        info!(balance = %after.balance, "Ledger document canceled");
        self.audit
            .record(
                ctx,
                AuditEntry::new("CANCEL", kind.table_name(), Some(id))
                    .before(&json!({ "status": before.status }))
                    .after(&json!({
                        "status": after.status,
                        "reason": after.cancel_reason,
                    })),
            )
            .await;

        Ok(after)
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, document_id = %id))]
    pub async fn reschedule(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        id: Uuid,
        input: RescheduleDocument,
    ) -> Result<ledger_document::Model, ServiceError> {
        input.validate()?;
        require_text("reason", &input.reason)?;
        let tenant_id = ctx.tenant_id;
        let new_due_date = input.new_due_date;

        let (before, after) = self
            .db
            .transaction::<_, (ledger_document::Model, ledger_document::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let document = find_document(txn, tenant_id, kind, id).await?;
                    ensure_open(&document, "reschedule")?;
                    if document.due_date == new_due_date {
                        return Err(ServiceError::ValidationError(format!(
                            "document is already due on {new_due_date}"
                        )));
                    }

                    let mut active: ledger_document::ActiveModel = document.clone().into();
                    active.due_date = Set(new_due_date);
                    let updated = save_document(txn, &document, active).await?;
                    Ok((document, updated))
                })
            })
            .await?;

        info!(
            old_due_date = %before.due_date,
            new_due_date = %after.due_date,
            "Ledger document rescheduled"
        );
        self.audit
            .record(
                ctx,
                AuditEntry::new("RESCHEDULE", kind.table_name(), Some(id))
                    .before(&json!({ "due_date": before.due_date }))
                    .after(&json!({
                        "due_date": after.due_date,
                        "reason": input.reason.trim(),
                        "actor": ctx.user_id,
                    })),
            )
            .await;

        Ok(after)
    }

    /// Recomputes the balance from the posting history.
    pub async fn reconcile(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
        id: Uuid,
    ) -> Result<Reconciliation, ServiceError> {
        let db = self.db.as_ref();
        let document = find_document(db, ctx.tenant_id, kind, id).await?;
        let postings = load_postings(db, id).await?;

        let applied_total: Decimal = postings.iter().map(|p| p.applied_amount).sum();
        let recomputed_balance = document.total_amount - applied_total;

        Ok(Reconciliation {
            document_id: document.id,
            total_amount: document.total_amount,
            applied_total,
            stored_balance: document.balance,
            recomputed_balance,
            postings: postings.len() as u64,
            consistent: recomputed_balance == document.balance,
        })
    }

    pub async fn summary(
        &self,
        ctx: &RequestContext,
        kind: LedgerKind,
    ) -> Result<LedgerSummary, ServiceError> {
        use ledger_document::Column;

        let db = self.db.as_ref();
        let today = Utc::now().date_naive();
        let due_soon_until = today + Duration::days(DUE_SOON_DAYS);
        let month_start = today.with_day(1).unwrap_or(today);

        let open = ledger_document::Entity::find()
            .filter(Column::TenantId.eq(ctx.tenant_id))
            .filter(Column::Kind.eq(kind))
            .filter(Column::Status.eq(DocumentStatus::Open))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut summary = LedgerSummary {
            kind,
            open_total: Decimal::ZERO,
            open_count: 0,
            overdue_total: Decimal::ZERO,
            overdue_count: 0,
            due_soon_total: Decimal::ZERO,
            due_soon_count: 0,
            settled_this_month: Decimal::ZERO,
            top_counterparties: Vec::new(),
        };
        let mut by_counterparty: HashMap<Uuid, CounterpartyBalance> = HashMap::new();

        for document in &open {
            summary.open_total += document.balance;
            summary.open_count += 1;
            if document.is_overdue(today) {
                summary.overdue_total += document.balance;
                summary.overdue_count += 1;
            } else if document.due_date <= due_soon_until {
                summary.due_soon_total += document.balance;
                summary.due_soon_count += 1;
            }
            let entry = by_counterparty
                .entry(document.counterparty_id)
                .or_insert_with(|| CounterpartyBalance {
                    counterparty_id: document.counterparty_id,
                    open_balance: Decimal::ZERO,
                    documents: 0,
                });
            entry.open_balance += document.balance;
            entry.documents += 1;
        }

        let mut top: Vec<CounterpartyBalance> = by_counterparty.into_values().collect();
        top.sort_by(|a, b| {
            b.open_balance
                .cmp(&a.open_balance)
                .then_with(|| a.counterparty_id.cmp(&b.counterparty_id))
        });
        top.truncate(TOP_COUNTERPARTIES);
        summary.top_counterparties = top;

        let settled: Vec<Decimal> = ledger_posting::Entity::find()
            .select_only()
            .column(ledger_posting::Column::AppliedAmount)
            .join(
                sea_orm::JoinType::InnerJoin,
                ledger_posting::Relation::Document.def(),
            )
            .filter(Column::TenantId.eq(ctx.tenant_id))
            .filter(Column::Kind.eq(kind))
            .filter(Column::Status.ne(DocumentStatus::Canceled))
            .filter(ledger_posting::Column::EffectiveDate.gte(month_start))
            .filter(ledger_posting::Column::EffectiveDate.lte(today))
            .into_tuple()
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        summary.settled_this_month = settled.into_iter().sum();

        Ok(summary)
    }

    /// Projects open receivables against open payables over the next `days`.
    pub async fn cash_flow(
        &self,
        ctx: &RequestContext,
        days: Option<u32>,
    ) -> Result<CashFlowProjection, ServiceError> {
        use ledger_document::Column;

        let days = days.unwrap_or(DEFAULT_CASH_FLOW_DAYS);
        if !(1..=MAX_CASH_FLOW_DAYS).contains(&days) {
            return Err(ServiceError::ValidationError(format!(
                "days must be between 1 and {MAX_CASH_FLOW_DAYS}"
            )));
        }
        let from = Utc::now().date_naive();
        let to = from + Duration::days(i64::from(days));

        let open = ledger_document::Entity::find()
            .filter(Column::TenantId.eq(ctx.tenant_id))
            .filter(Column::Status.eq(DocumentStatus::Open))
            .filter(Column::DueDate.gte(from))
            .filter(Column::DueDate.lte(to))
            .order_by_asc(Column::DueDate)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let by_date = project_cash_flow(&open, from, to);
        let receivable_total: Decimal = by_date.iter().map(|day| day.receivable).sum();
        let payable_total: Decimal = by_date.iter().map(|day| day.payable).sum();

        Ok(CashFlowProjection {
            days,
            from,
            to,
            receivable_total,
            payable_total,
            net: receivable_total - payable_total,
            by_date,
        })
    }
}

async fn find_document<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    kind: LedgerKind,
    id: Uuid,
) -> Result<ledger_document::Model, ServiceError> {
    ledger_document::Entity::find_by_id(id)
        .filter(ledger_document::Column::TenantId.eq(tenant_id))
        .filter(ledger_document::Column::Kind.eq(kind))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("{} {} not found", kind.label(), id)))
}

async fn load_postings<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
) -> Result<Vec<ledger_posting::Model>, ServiceError> {
    ledger_posting::Entity::find()
        .filter(ledger_posting::Column::DocumentId.eq(document_id))
        .order_by_asc(ledger_posting::Column::CreatedAt)
        .order_by_asc(ledger_posting::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn ensure_open(document: &ledger_document::Model, action: &str) -> Result<(), ServiceError> {
    if document.is_open() {
        return Ok(());
    }
    Err(ServiceError::InvalidState(format!(
        "cannot {action} {} {}: document is {}; already settled or canceled",
        document.kind.label(),
        document.document_number,
        document.status.to_value()
    )))
}

/// Writes `active` only if the row still carries the version that was read.
async fn save_document(
    txn: &DatabaseTransaction,
    current: &ledger_document::Model,
    mut active: ledger_document::ActiveModel,
) -> Result<ledger_document::Model, ServiceError> {
    active.version = Set(current.version + 1);
    active.updated_at = Set(Utc::now());

    let result = ledger_document::Entity::update_many()
        .set(active)
        .filter(ledger_document::Column::Id.eq(current.id))
        .filter(ledger_document::Column::Version.eq(current.version))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected != 1 {
        return Err(ServiceError::Conflict(format!(
            "{} {} was modified concurrently; retry",
            current.kind.label(),
            current.document_number
        )));
    }

    ledger_document::Entity::find_by_id(current.id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("document {} disappeared", current.id)))
}

async fn book_bank_entry(
    txn: &DatabaseTransaction,
    document: &ledger_document::Model,
    posting: &ledger_posting::Model,
    bank_account_id: Uuid,
) -> Result<bank_ledger_entry::Model, ServiceError> {
    let (direction, category) = match document.kind {
        LedgerKind::Receivable => (EntryDirection::Credit, BankEntryCategory::Receipt),
        LedgerKind::Payable => (EntryDirection::Debit, BankEntryCategory::Payment),
    };

    bank_ledger_entry::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(document.tenant_id),
        bank_account_id: Set(bank_account_id),
        direction: Set(direction),
        amount: Set(posting.net_amount),
        entry_date: Set(posting.effective_date),
        category: Set(category),
        origin_type: Set(BankEntryOrigin::LedgerPosting),
        origin_id: Set(posting.id),
        trace_tag: Set(document.document_number.clone()),
        description: Set(format!(
            "{} {} settlement",
            document.kind.label(),
            document.document_number
        )),
        reconciled: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)
}
