use crate::{
    context::RequestContext,
    db::{end_of_day_exclusive, fetch_page, start_of_day, DbPool, FilterBuilder, Page, PageWindow},
    entities::{
        bank_ledger_entry::{self, BankEntryCategory, BankEntryOrigin, EntryDirection},
        cash_closing_line,
        cash_movement::{self, CashMovementKind},
        cash_session::{self, CashSessionStatus},
        till, FlowDirection, PaymentMethod,
    },
    errors::ServiceError,
    services::{
        audit::{AuditEntry, AuditService},
        require_amount, require_non_negative,
        tills::find_till,
    },
};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const RECENT_MOVEMENTS: u64 = 20;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct OpenSession {
    pub till_id: Uuid,
    pub opening_amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CashSupply {
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CashWithdrawal {
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    /// Bank account receiving the cash; defaults to the till's account
    pub destination_bank_account_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CashSale {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    #[validate(length(max = 64))]
    pub reference: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InformedAmount {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CloseSession {
    /// Physical count per payment method; absent methods count as zero
    #[serde(default)]
    #[validate(length(max = 20))]
    pub informed: Vec<InformedAmount>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl CloseSession {
    fn informed_by_method(&self) -> Result<BTreeMap<PaymentMethod, Decimal>, ServiceError> {
        let mut by_method = BTreeMap::new();
        for line in &self.informed {
            require_non_negative("informed.amount", line.amount)?;
            if by_method.insert(line.payment_method, line.amount).is_some() {
                return Err(ServiceError::ValidationError(format!(
                    "payment method {:?} informed more than once",
                    line.payment_method
                )));
            }
        }
        Ok(by_method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MethodTotals {
    pub payment_method: PaymentMethod,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net: Decimal,
}

/// Running position of a session computed from its movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionTally {
    /// opening + all signed movements
    pub live_balance: Decimal,
    /// opening + signed CASH movements
    pub cash_balance: Decimal,
    pub by_method: Vec<MethodTotals>,
}

pub fn tally(opening_amount: Decimal, movements: &[cash_movement::Model]) -> SessionTally {
    let mut by_method: BTreeMap<PaymentMethod, MethodTotals> = BTreeMap::new();
    let mut live_balance = opening_amount;
    let mut cash_balance = opening_amount;

    for movement in movements {
        let signed = movement.signed_amount();
        live_balance += signed;
        if movement.payment_method == PaymentMethod::Cash {
            cash_balance += signed;
        }

        let totals = by_method
            .entry(movement.payment_method)
            .or_insert_with(|| MethodTotals {
                payment_method: movement.payment_method,
                inflow: Decimal::ZERO,
                outflow: Decimal::ZERO,
                net: Decimal::ZERO,
            });
        match movement.direction {
            FlowDirection::In => totals.inflow += movement.amount,
            FlowDirection::Out => totals.outflow += movement.amount,
        }
        totals.net += signed;
    }

    SessionTally {
        live_balance,
        cash_balance,
        by_method: by_method.into_values().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosingFigures {
    pub method: PaymentMethod,
    pub system_amount: Decimal,
    pub informed_amount: Decimal,
    pub difference: Decimal,
}

/// One line per method seen in either the movements or the informed count.
/// CASH always appears and its system amount includes the opening amount.
pub fn closing_figures(
    opening_amount: Decimal,
    tally: &SessionTally,
    informed: &BTreeMap<PaymentMethod, Decimal>,
) -> Vec<ClosingFigures> {
    let mut methods: BTreeSet<PaymentMethod> = informed.keys().copied().collect();
    methods.extend(tally.by_method.iter().map(|t| t.payment_method));
    methods.insert(PaymentMethod::Cash);

    methods
        .into_iter()
        .map(|method| {
            let net = tally
                .by_method
                .iter()
                .find(|t| t.payment_method == method)
                .map(|t| t.net)
                .unwrap_or_default();
            let system_amount = if method == PaymentMethod::Cash {
                opening_amount + net
            } else {
                net
            };
            let informed_amount = informed.get(&method).copied().unwrap_or_default();
            ClosingFigures {
                method,
                system_amount,
                informed_amount,
                difference: informed_amount - system_amount,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementReceipt {
    pub movement: cash_movement::Model,
    pub live_balance: Decimal,
    pub cash_balance: Decimal,
    pub bank_entry_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CloseResult {
    pub session: cash_session::Model,
    pub lines: Vec<cash_closing_line::Model>,
    pub system_amount: Decimal,
    pub informed_amount: Decimal,
    pub discrepancy: Decimal,
}

impl CloseResult {
    pub fn message(&self) -> String {
        if self.discrepancy.is_zero() {
            "Cash session closed without discrepancy".to_string()
        } else {
            format!(
                "Cash session closed with discrepancy of {}",
                self.discrepancy
            )
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionOverview {
    pub session: cash_session::Model,
    #[serde(flatten)]
    pub tally: SessionTally,
    pub recent_movements: Vec<cash_movement::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionDetail {
    pub session: cash_session::Model,
    pub till: till::Model,
    #[serde(flatten)]
    pub tally: SessionTally,
    pub movements: Vec<cash_movement::Model>,
    pub closing_lines: Vec<cash_closing_line::Model>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionFilters {
    pub till_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub status: Option<CashSessionStatus>,
    pub opened_from: Option<NaiveDate>,
    pub opened_to: Option<NaiveDate>,
}

/// Opens, posts to and closes till sessions.
#[derive(Clone)]
pub struct CashSessionService {
    db: Arc<DbPool>,
    audit: AuditService,
}

impl CashSessionService {
    pub fn new(db: Arc<DbPool>, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Exclusivity per till and per operator is backed by partial unique
    /// indexes; the lookups below only produce a friendlier message.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, till_id = %input.till_id))]
    pub async fn open(
        &self,
        ctx: &RequestContext,
        input: OpenSession,
    ) -> Result<cash_session::Model, ServiceError> {
        input.validate()?;
        require_non_negative("opening_amount", input.opening_amount)?;

        let db = self.db.as_ref();
        let till = find_till(db, ctx.tenant_id, input.till_id).await?;
        if !till.active {
            return Err(ServiceError::InvalidState(format!(
                "till {} is inactive",
                till.name
            )));
        }

        if find_open_session(db, ctx.tenant_id, cash_session::Column::TillId, till.id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "till {} already has an open session",
                till.name
            )));
        }
        if find_open_session(db, ctx.tenant_id, cash_session::Column::OperatorId, ctx.user_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "operator already holds an open cash session".into(),
            ));
        }

        let now = Utc::now();
        let session = cash_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            till_id: Set(till.id),
            operator_id: Set(ctx.user_id),
            status: Set(CashSessionStatus::Open),
            opening_amount: Set(input.opening_amount),
            opening_note: Set(input.note),
            opened_at: Set(now),
            closed_at: Set(None),
            system_amount: Set(None),
            informed_amount: Set(None),
            discrepancy: Set(None),
            closing_note: Set(None),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|e| {
            ServiceError::from_write(e, || {
                "till or operator already has an open cash session".to_string()
            })
        })?;

        counter!("planac_cash.sessions_opened", 1);
        info!(session_id = %session.id, opening = %session.opening_amount, "Cash session opened");
        self.audit
            .record(
                ctx,
                AuditEntry::new("OPEN", "cash_sessions", Some(session.id)).after(&session),
            )
            .await;

        Ok(session)
    }

    pub async fn post_supply(
        &self,
        ctx: &RequestContext,
        session_id: Uuid,
        input: CashSupply,
    ) -> Result<MovementReceipt, ServiceError> {
        input.validate()?;
        require_amount("amount", input.amount)?;

        let receipt = self
            .post(
                ctx,
                session_id,
                NewMovement {
                    kind: CashMovementKind::Supply,
                    direction: FlowDirection::In,
                    method: PaymentMethod::Cash,
                    amount: input.amount,
                    note: input.note,
                    reference: None,
                    destination: None,
                },
            )
            .await?;

        info!(session_id = %session_id, amount = %input.amount, "Cash supply posted");
        Ok(receipt)
    }

    /// Fails with `InsufficientFunds` when the amount exceeds the cash on hand.
    pub async fn post_withdrawal(
        &self,
        ctx: &RequestContext,
        session_id: Uuid,
        input: CashWithdrawal,
    ) -> Result<MovementReceipt, ServiceError> {
        input.validate()?;
        require_amount("amount", input.amount)?;

        let receipt = self
            .post(
                ctx,
                session_id,
                NewMovement {
                    kind: CashMovementKind::Withdrawal,
                    direction: FlowDirection::Out,
                    method: PaymentMethod::Cash,
                    amount: input.amount,
                    note: input.note,
                    reference: None,
                    destination: input.destination_bank_account_id,
                },
            )
            .await;

        if let Err(ServiceError::InsufficientFunds(_) | ServiceError::Precondition(_)) = &receipt {
            counter!("planac_cash.withdrawals_rejected", 1);
        }
        let receipt = receipt?;
        info!(
            session_id = %session_id,
            amount = %input.amount,
            bank_entry = ?receipt.bank_entry_id,
            "Cash withdrawal posted"
        );
        Ok(receipt)
    }

    pub async fn record_sale(
        &self,
        ctx: &RequestContext,
        session_id: Uuid,
        input: CashSale,
    ) -> Result<MovementReceipt, ServiceError> {
        input.validate()?;
        require_amount("amount", input.amount)?;

        self.post(
            ctx,
            session_id,
            NewMovement {
                kind: CashMovementKind::Sale,
                direction: FlowDirection::In,
                method: input.payment_method,
                amount: input.amount,
                note: input.note,
                reference: input.reference,
                destination: None,
            },
        )
        .await
    }

    async fn post(
        &self,
        ctx: &RequestContext,
        session_id: Uuid,
        movement: NewMovement,
    ) -> Result<MovementReceipt, ServiceError> {
        let (tenant_id, operator_id) = (ctx.tenant_id, ctx.user_id);

        let receipt = self
            .db
            .transaction::<_, MovementReceipt, ServiceError>(move |txn| {
                Box::pin(async move {
                    let session = find_session(txn, tenant_id, session_id).await?;
                    lock_open_session(txn, &session).await?;
                    let movements = load_movements(txn, session.id).await?;
                    let before = tally(session.opening_amount, &movements);

                    let mut till = None;
                    if movement.kind == CashMovementKind::Withdrawal {
                        let session_till = find_till(txn, tenant_id, session.till_id).await?;
                        if let Some(cap) = session_till.withdrawal_cap() {
                            if movement.amount > cap {
                                return Err(ServiceError::Precondition(format!(
                                    "withdrawal of {} exceeds the till limit of {}",
                                    movement.amount, cap
                                )));
                            }
                        }
                        if movement.amount > before.cash_balance {
                            return Err(ServiceError::InsufficientFunds(format!(
                                "withdrawal of {} exceeds cash on hand of {}",
                                movement.amount, before.cash_balance
                            )));
                        }
                        till = Some(session_till);
                    }

                    let now = Utc::now();
                    let saved = cash_movement::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        session_id: Set(session.id),
                        kind: Set(movement.kind),
                        direction: Set(movement.direction),
                        payment_method: Set(movement.method),
                        amount: Set(movement.amount),
                        note: Set(movement.note),
                        reference: Set(movement.reference),
                        destination_bank_account_id: Set(movement.destination),
                        operator_id: Set(operator_id),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    let account = movement
                        .destination
                        .or_else(|| till.as_ref().and_then(|t| t.bank_account_id));
                    let bank_entry_id = match (movement.kind, account) {
                        (CashMovementKind::Withdrawal, Some(account)) => Some(
                            bank_ledger_entry::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                tenant_id: Set(tenant_id),
                                bank_account_id: Set(account),
                                direction: Set(EntryDirection::Credit),
                                amount: Set(saved.amount),
                                entry_date: Set(now.date_naive()),
                                category: Set(BankEntryCategory::TillWithdrawal),
                                origin_type: Set(BankEntryOrigin::CashMovement),
                                origin_id: Set(saved.id),
                                trace_tag: Set(session.id.to_string()),
                                description: Set(format!(
                                    "Withdrawal from till {}",
                                    till.as_ref().map(|t| t.name.as_str()).unwrap_or("-")
                                )),
                                reconciled: Set(false),
                                created_at: Set(now),
                            }
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .id,
                        ),
                        _ => None,
                    };

                    let signed = saved.signed_amount();
                    let cash_delta = if saved.payment_method == PaymentMethod::Cash {
                        signed
                    } else {
                        Decimal::ZERO
                    };
                    Ok(MovementReceipt {
                        live_balance: before.live_balance + signed,
                        cash_balance: before.cash_balance + cash_delta,
                        movement: saved,
                        bank_entry_id,
                    })
                })
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditEntry::new("POST_MOVEMENT", "cash_movements", Some(receipt.movement.id))
                    .after(&receipt.movement),
            )
            .await;

        Ok(receipt)
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, session_id = %session_id))]
    pub async fn close(
        &self,
        ctx: &RequestContext,
        session_id: Uuid,
        input: CloseSession,
    ) -> Result<CloseResult, ServiceError> {
        input.validate()?;
        let informed = input.informed_by_method()?;
        let tenant_id = ctx.tenant_id;
        let note = input.note;

        let result = self
            .db
            .transaction::<_, CloseResult, ServiceError>(move |txn| {
                Box::pin(async move {
                    let session = find_session(txn, tenant_id, session_id).await?;
                    lock_open_session(txn, &session).await?;
                    let movements = load_movements(txn, session.id).await?;
                    let totals = tally(session.opening_amount, &movements);
                    let figures = closing_figures(session.opening_amount, &totals, &informed);

                    let system_amount = totals.live_balance;
                    let informed_amount: Decimal = informed.values().copied().sum();
                    let discrepancy = informed_amount - system_amount;

                    let mut lines = Vec::with_capacity(figures.len());
                    for figure in figures {
                        lines.push(
                            cash_closing_line::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                session_id: Set(session.id),
                                payment_method: Set(figure.method),
                                system_amount: Set(figure.system_amount),
                                informed_amount: Set(figure.informed_amount),
                                difference: Set(figure.difference),
                            }
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?,
                        );
                    }

                    let now = Utc::now();
                    let mut active: cash_session::ActiveModel = session.into();
                    active.status = Set(CashSessionStatus::Closed);
                    active.closed_at = Set(Some(now));
                    active.system_amount = Set(Some(system_amount));
                    active.informed_amount = Set(Some(informed_amount));
                    active.discrepancy = Set(Some(discrepancy));
                    active.closing_note = Set(note);
                    active.updated_at = Set(now);
                    let session = active.update(txn).await.map_err(ServiceError::db_error)?;

                    Ok(CloseResult {
                        session,
                        lines,
                        system_amount,
                        informed_amount,
                        discrepancy,
                    })
                })
            })
            .await?;

        counter!("planac_cash.sessions_closed", 1);
        if result.discrepancy.is_zero() {
            info!(system = %result.system_amount, "Cash session closed");
        } else {
            warn!(
                system = %result.system_amount,
                informed = %result.informed_amount,
                discrepancy = %result.discrepancy,
                "Cash session closed with discrepancy"
            );
        }
        self.audit
            .record(
                ctx,
                AuditEntry::new("CLOSE", "cash_sessions", Some(session_id))
                    .after(&result.session),
            )
            .await;

        Ok(result)
    }

    /// Closes the caller's own open session.
    pub async fn close_current(
        &self,
        ctx: &RequestContext,
        input: CloseSession,
    ) -> Result<CloseResult, ServiceError> {
        let session = self.operator_session(ctx).await?;
        self.close(ctx, session.id, input).await
    }

    pub async fn current_session(
        &self,
        ctx: &RequestContext,
    ) -> Result<SessionOverview, ServiceError> {
        let db = self.db.as_ref();
        let session = self.operator_session(ctx).await?;
        let movements = load_movements(db, session.id).await?;
        let totals = tally(session.opening_amount, &movements);

        let recent_movements = cash_movement::Entity::find()
            .filter(cash_movement::Column::SessionId.eq(session.id))
            .order_by_desc(cash_movement::Column::CreatedAt)
            .limit(RECENT_MOVEMENTS)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(SessionOverview {
            session,
            tally: totals,
            recent_movements,
        })
    }

    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<SessionDetail, ServiceError> {
        let db = self.db.as_ref();
        let session = find_session(db, ctx.tenant_id, id).await?;
        let till = find_till(db, ctx.tenant_id, session.till_id).await?;
        let movements = load_movements(db, session.id).await?;
        let closing_lines = cash_closing_line::Entity::find()
            .filter(cash_closing_line::Column::SessionId.eq(session.id))
            .order_by_asc(cash_closing_line::Column::PaymentMethod)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(SessionDetail {
            tally: tally(session.opening_amount, &movements),
            session,
            till,
            movements,
            closing_lines,
        })
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filters: &SessionFilters,
        window: PageWindow,
    ) -> Result<Page<cash_session::Model>, ServiceError> {
        use cash_session::Column;

        let condition = FilterBuilder::new()
            .eq(Column::TenantId, ctx.tenant_id)
            .eq_opt(Column::TillId, filters.till_id)
            .eq_opt(Column::OperatorId, filters.operator_id)
            .eq_opt(Column::Status, filters.status)
            .gte_opt(Column::OpenedAt, filters.opened_from.map(start_of_day))
            .lt_opt(Column::OpenedAt, filters.opened_to.map(end_of_day_exclusive))
            .build();

        fetch_page::<cash_session::Entity, _, _>(
            self.db.as_ref(),
            condition,
            |q| q.order_by_desc(Column::OpenedAt),
            window,
        )
        .await
        .map_err(ServiceError::db_error)
    }

    async fn operator_session(
        &self,
        ctx: &RequestContext,
    ) -> Result<cash_session::Model, ServiceError> {
        find_open_session(
            self.db.as_ref(),
            ctx.tenant_id,
            cash_session::Column::OperatorId,
            ctx.user_id,
        )
        .await?
        .ok_or_else(|| ServiceError::NotFound("operator has no open cash session".into()))
    }
}

struct NewMovement {
    kind: CashMovementKind,
    direction: FlowDirection,
    method: PaymentMethod,
    amount: Decimal,
    note: Option<String>,
    reference: Option<String>,
    destination: Option<Uuid>,
}

async fn find_session<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<cash_session::Model, ServiceError> {
    cash_session::Entity::find_by_id(id)
        .filter(cash_session::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("cash session {id} not found")))
}

async fn find_open_session<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    column: cash_session::Column,
    value: Uuid,
) -> Result<Option<cash_session::Model>, ServiceError> {
    cash_session::Entity::find()
        .filter(cash_session::Column::TenantId.eq(tenant_id))
        .filter(column.eq(value))
        .filter(cash_session::Column::Status.eq(CashSessionStatus::Open))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Touches the session row so concurrent posters serialize on it, and fails
/// unless it is still open.
async fn lock_open_session(
    txn: &DatabaseTransaction,
    session: &cash_session::Model,
) -> Result<(), ServiceError> {
    let result = cash_session::Entity::update_many()
        .col_expr(cash_session::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cash_session::Column::Id.eq(session.id))
        .filter(cash_session::Column::Status.eq(CashSessionStatus::Open))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InvalidState(format!(
            "cash session {} is CLOSED",
            session.id
        )));
    }
    Ok(())
}

async fn load_movements<C: ConnectionTrait>(
    conn: &C,
    session_id: Uuid,
) -> Result<Vec<cash_movement::Model>, ServiceError> {
    cash_movement::Entity::find()
        .filter(cash_movement::Column::SessionId.eq(session_id))
        .order_by_asc(cash_movement::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn movement(
        kind: CashMovementKind,
        direction: FlowDirection,
        method: PaymentMethod,
        amount: Decimal,
    ) -> cash_movement::Model {
        cash_movement::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            session_id: Uuid::nil(),
            kind,
            direction,
            payment_method: method,
            amount,
            note: None,
            reference: None,
            destination_bank_account_id: None,
            operator_id: Uuid::nil(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tally_tracks_cash_separately() {
        let movements = vec![
            movement(CashMovementKind::Supply, FlowDirection::In, PaymentMethod::Cash, dec!(50)),
            movement(CashMovementKind::Withdrawal, FlowDirection::Out, PaymentMethod::Cash, dec!(30)),
            movement(CashMovementKind::Sale, FlowDirection::In, PaymentMethod::Pix, dec!(80)),
        ];
        let totals = tally(dec!(100), &movements);

        assert_eq!(totals.live_balance, dec!(200));
        assert_eq!(totals.cash_balance, dec!(120));
        assert_eq!(
            totals.by_method,
            vec![
                MethodTotals {
                    payment_method: PaymentMethod::Cash,
                    inflow: dec!(50),
                    outflow: dec!(30),
                    net: dec!(20),
                },
                MethodTotals {
                    payment_method: PaymentMethod::Pix,
                    inflow: dec!(80),
                    outflow: dec!(0),
                    net: dec!(80),
                },
            ]
        );
    }

    #[test]
    fn closing_figures_include_opening_in_cash() {
        let movements = vec![
            movement(CashMovementKind::Supply, FlowDirection::In, PaymentMethod::Cash, dec!(50)),
            movement(CashMovementKind::Withdrawal, FlowDirection::Out, PaymentMethod::Cash, dec!(30)),
        ];
        let totals = tally(dec!(100), &movements);
        let informed = BTreeMap::from([
            (PaymentMethod::Cash, dec!(125)),
            (PaymentMethod::DebitCard, dec!(10)),
        ]);

        let figures = closing_figures(dec!(100), &totals, &informed);
        assert_eq!(figures.len(), 2);
        assert_eq!(
            figures[0],
            ClosingFigures {
                method: PaymentMethod::Cash,
                system_amount: dec!(120),
                informed_amount: dec!(125),
                difference: dec!(5),
            }
        );
        assert_eq!(figures[1].method, PaymentMethod::DebitCard);
        assert_eq!(figures[1].system_amount, dec!(0));
        assert_eq!(figures[1].difference, dec!(10));
    }

    #[test]
    fn duplicate_informed_methods_are_rejected() {
        let input = CloseSession {
            informed: vec![
                InformedAmount {
                    payment_method: PaymentMethod::Cash,
                    amount: dec!(1),
                },
                InformedAmount {
                    payment_method: PaymentMethod::Cash,
                    amount: dec!(2),
                },
            ],
            note: None,
        };
        assert!(matches!(
            input.informed_by_method(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn close_message_names_discrepancy() {
        let result = CloseResult {
            session: cash_session::Model {
                id: Uuid::nil(),
                tenant_id: Uuid::nil(),
                till_id: Uuid::nil(),
                operator_id: Uuid::nil(),
                status: CashSessionStatus::Closed,
                opening_amount: dec!(100),
                opening_note: None,
                opened_at: Utc::now(),
                closed_at: Some(Utc::now()),
                system_amount: Some(dec!(120)),
                informed_amount: Some(dec!(125)),
                discrepancy: Some(dec!(5)),
                closing_note: None,
                updated_at: Utc::now(),
            },
            lines: vec![],
            system_amount: dec!(120),
            informed_amount: dec!(125),
            discrepancy: dec!(5),
        };
        assert_eq!(
            result.message(),
            "Cash session closed with discrepancy of 5"
        );
    }
}
