mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use planac_erp::{
    db::PageWindow,
    entities::{
        bank_ledger_entry::{self, BankEntryCategory, EntryDirection},
        ledger_document::{self, DocumentStatus, DocumentType, LedgerKind},
        PaymentMethod,
    },
    errors::ServiceError,
    services::settlement::{
        ApplyPosting, BreakdownLine, CancelDocument, CreateDocument, DocumentFilters,
        DocumentPatch, RescheduleDocument,
    },
};

use common::TestApp;

fn new_document(amount: Decimal) -> CreateDocument {
    CreateDocument {
        counterparty_id: Uuid::new_v4(),
        document_number: None,
        document_type: DocumentType::TradeBill,
        category: None,
        description: Some("Monthly supply".to_string()),
        installment: None,
        installment_count: None,
        issue_date: None,
        due_date: Utc::now().date_naive() + Duration::days(30),
        original_amount: amount,
        interest_amount: Decimal::ZERO,
        penalty_amount: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        bank_account_id: Some(Uuid::new_v4()),
        notes: None,
    }
}

async fn stored(app: &TestApp, id: Uuid) -> ledger_document::Model {
    ledger_document::Entity::find_by_id(id)
        .one(app.db())
        .await
        .expect("query document")
        .expect("document exists")
}

#[tokio::test]
async fn full_payment_settles_document() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(1000.00)))
        .await
        .expect("create document");
    assert_eq!(document.total_amount, dec!(1000.00));
    assert_eq!(document.balance, dec!(1000.00));
    assert_eq!(document.status, DocumentStatus::Open);
    assert_eq!(document.document_number, "000001");

    let result = settlement
        .apply(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            ApplyPosting::single(dec!(1000.00), PaymentMethod::Pix),
        )
        .await
        .expect("apply posting");

    assert_eq!(result.new_balance, Decimal::ZERO);
    assert_eq!(result.new_status, DocumentStatus::Settled);
    assert_eq!(result.excess_amount, Decimal::ZERO);
    assert_eq!(result.message(), "Settled clean");

    let after = stored(&app, document.id).await;
    assert_eq!(after.balance, Decimal::ZERO);
    assert_eq!(after.status, DocumentStatus::Settled);
    assert!(after.settled_at.is_some());

    let entry_id = result.bank_entry_id.expect("bank entry booked");
    let entry = bank_ledger_entry::Entity::find_by_id(entry_id)
        .one(app.db())
        .await
        .expect("query bank entry")
        .expect("bank entry exists");
    assert_eq!(entry.amount, dec!(1000.00));
    assert_eq!(entry.trace_tag, document.document_number);
}

#[tokio::test]
async fn partial_payments_then_third_attempt_is_rejected() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Payable, new_document(dec!(1000.00)))
        .await
        .expect("create document");

    let first = settlement
        .apply(
            &ctx,
            LedgerKind::Payable,
            document.id,
            ApplyPosting::single(dec!(400.00), PaymentMethod::BankTransfer),
        )
        .await
        .expect("first posting");
    assert_eq!(first.new_balance, dec!(600.00));
    assert_eq!(first.new_status, DocumentStatus::Open);

    let second = settlement
        .apply(
            &ctx,
            LedgerKind::Payable,
            document.id,
            ApplyPosting::single(dec!(600.00), PaymentMethod::BankTransfer),
        )
        .await
        .expect("second posting");
    assert_eq!(second.new_balance, Decimal::ZERO);
    assert_eq!(second.new_status, DocumentStatus::Settled);

    let third = settlement
        .apply(
            &ctx,
            LedgerKind::Payable,
            document.id,
            ApplyPosting::single(dec!(1.00), PaymentMethod::Cash),
        )
        .await;
    assert_matches!(third, Err(ServiceError::InvalidState(_)));

    let after = stored(&app, document.id).await;
    assert_eq!(after.balance, Decimal::ZERO);
    assert_eq!(after.amount_settled, dec!(1000.00));

    let detail = settlement
        .get(&ctx, LedgerKind::Payable, document.id)
        .await
        .expect("document detail");
    assert_eq!(detail.postings.len(), 2);
    assert_eq!(detail.postings[0].breakdown.len(), 1);
}

#[tokio::test]
async fn overpayment_is_kept_as_credit() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(100.00)))
        .await
        .expect("create document");

    let result = settlement
        .apply(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            ApplyPosting::single(dec!(120.00), PaymentMethod::Cash),
        )
        .await
        .expect("overpaying posting");

    assert_eq!(result.applied_amount, dec!(100.00));
    assert_eq!(result.excess_amount, dec!(20.00));
    assert_eq!(result.new_balance, Decimal::ZERO);
    assert!(result.message().starts_with("Settled with a credit of 20"));

    let after = stored(&app, document.id).await;
    assert_eq!(after.credit_amount, dec!(20.00));
    assert_eq!(after.amount_settled, dec!(100.00));

    let reconciliation = settlement
        .reconcile(&ctx, LedgerKind::Receivable, document.id)
        .await
        .expect("reconcile");
    assert!(reconciliation.consistent);
    assert_eq!(reconciliation.applied_total, dec!(100.00));
    assert_eq!(reconciliation.postings, 1);
}

#[tokio::test]
async fn rejected_posting_leaves_balance_untouched() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(500.00)))
        .await
        .expect("create document");

    let mut mismatched = ApplyPosting::single(dec!(200.00), PaymentMethod::Cash);
    mismatched.breakdown.push(BreakdownLine {
        payment_method: PaymentMethod::Pix,
        amount: dec!(50.00),
    });
    let result = settlement
        .apply(&ctx, LedgerKind::Receivable, document.id, mismatched)
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let after = stored(&app, document.id).await;
    assert_eq!(after.balance, dec!(500.00));
    assert_eq!(after.version, document.version);
}

#[tokio::test]
async fn cancel_is_only_legal_while_open() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let open = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(80.00)))
        .await
        .expect("create document");
    let canceled = settlement
        .cancel(
            &ctx,
            LedgerKind::Receivable,
            open.id,
            CancelDocument {
                reason: "Duplicate entry".to_string(),
            },
        )
        .await
        .expect("cancel open document");
    assert_eq!(canceled.status, DocumentStatus::Canceled);
    assert_eq!(canceled.balance, dec!(80.00));

    let apply_after_cancel = settlement
        .apply(
            &ctx,
            LedgerKind::Receivable,
            open.id,
            ApplyPosting::single(dec!(80.00), PaymentMethod::Cash),
        )
        .await;
    assert_matches!(apply_after_cancel, Err(ServiceError::InvalidState(_)));

    let settled = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(30.00)))
        .await
        .expect("create document");
    settlement
        .apply(
            &ctx,
            LedgerKind::Receivable,
            settled.id,
            ApplyPosting::single(dec!(30.00), PaymentMethod::Cash),
        )
        .await
        .expect("settle");
    let cancel_settled = settlement
        .cancel(
            &ctx,
            LedgerKind::Receivable,
            settled.id,
            CancelDocument {
                reason: "Changed our mind".to_string(),
            },
        )
        .await;
    assert_matches!(cancel_settled, Err(ServiceError::InvalidState(_)));
    assert_eq!(stored(&app, settled.id).await.status, DocumentStatus::Settled);
}

#[tokio::test]
async fn documents_are_scoped_by_tenant_and_kind() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(10.00)))
        .await
        .expect("create document");

    let stranger = planac_erp::context::RequestContext::new(Uuid::new_v4(), Uuid::new_v4());
    assert_matches!(
        settlement
            .get(&stranger, LedgerKind::Receivable, document.id)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        settlement.get(&ctx, LedgerKind::Payable, document.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn update_reschedule_and_list() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(250.00)))
        .await
        .expect("create document");

    let updated = settlement
        .update(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            DocumentPatch {
                notes: Some("Call before due date".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update notes");
    assert_eq!(updated.notes.as_deref(), Some("Call before due date"));
    assert_eq!(updated.balance, dec!(250.00));

    let empty_patch = settlement
        .update(&ctx, LedgerKind::Receivable, document.id, DocumentPatch::default())
        .await;
    assert_matches!(empty_patch, Err(ServiceError::ValidationError(_)));

    let new_due = document.due_date + Duration::days(15);
    let rescheduled = settlement
        .reschedule(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            RescheduleDocument {
                new_due_date: new_due,
                reason: "Customer request".to_string(),
            },
        )
        .await
        .expect("reschedule");
    assert_eq!(rescheduled.due_date, new_due);

    settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(75.00)))
        .await
        .expect("second document");

    let page = settlement
        .list(
            &ctx,
            LedgerKind::Receivable,
            &DocumentFilters::default(),
            PageWindow { page: 1, limit: 1 },
        )
        .await
        .expect("list documents");
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.pagination.total, 2);
    assert_eq!(page.pagination.pages, 2);

    let summary = settlement
        .summary(&ctx, LedgerKind::Receivable)
        .await
        .expect("summary");
    assert_eq!(summary.open_count, 2);
    assert_eq!(summary.open_total, dec!(325.00));

    let trail = planac_erp::entities::audit_log::Entity::find()
        .filter(planac_erp::entities::audit_log::Column::RecordId.eq(document.id))
        .all(app.db())
        .await
        .expect("audit rows");
    let actions: Vec<&str> = trail.iter().map(|row| row.action.as_str()).collect();
    assert!(actions.contains(&"CREATE"));
    assert!(actions.contains(&"UPDATE"));
    assert!(actions.contains(&"RESCHEDULE"));
}

#[tokio::test]
async fn settled_documents_cannot_be_updated_or_rescheduled() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Receivable, new_document(dec!(40.00)))
        .await
        .expect("create document");
    settlement
        .apply(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            ApplyPosting::single(dec!(40.00), PaymentMethod::Cash),
        )
        .await
        .expect("settle");

    let update = settlement
        .update(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            DocumentPatch {
                notes: Some("Too late".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(update, Err(ServiceError::InvalidState(_)));

    let reschedule = settlement
        .reschedule(
            &ctx,
            LedgerKind::Receivable,
            document.id,
            RescheduleDocument {
                new_due_date: document.due_date + Duration::days(5),
                reason: "Customer request".to_string(),
            },
        )
        .await;
    assert_matches!(reschedule, Err(ServiceError::InvalidState(msg)) if msg.contains("SETTLED"));

    let after = stored(&app, document.id).await;
    assert_eq!(after.due_date, document.due_date);
    assert_eq!(after.notes, document.notes);
}

#[tokio::test]
async fn payable_settlement_debits_the_bank_account() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    let document = settlement
        .create(&ctx, LedgerKind::Payable, new_document(dec!(250.00)))
        .await
        .expect("create payable");
    let result = settlement
        .apply(
            &ctx,
            LedgerKind::Payable,
            document.id,
            ApplyPosting::single(dec!(250.00), PaymentMethod::BankTransfer),
        )
        .await
        .expect("pay supplier");

    let entry = bank_ledger_entry::Entity::find_by_id(result.bank_entry_id.expect("bank entry"))
        .one(app.db())
        .await
        .expect("query bank entry")
        .expect("bank entry exists");
    assert_eq!(entry.direction, EntryDirection::Debit);
    assert_eq!(entry.category, BankEntryCategory::Payment);
    assert_eq!(Some(entry.bank_account_id), document.bank_account_id);
    assert_eq!(entry.amount, dec!(250.00));
}

fn due_in(amount: Decimal, days: i64) -> CreateDocument {
    CreateDocument {
        due_date: Utc::now().date_naive() + Duration::days(days),
        ..new_document(amount)
    }
}

#[tokio::test]
async fn cash_flow_projects_open_balances_by_due_date() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let settlement = &app.state.services.settlement;

    settlement
        .create(&ctx, LedgerKind::Receivable, due_in(dec!(300.00), 5))
        .await
        .expect("receivable in 5 days");
    settlement
        .create(&ctx, LedgerKind::Payable, due_in(dec!(100.00), 5))
        .await
        .expect("payable in 5 days");
    let partly_paid = settlement
        .create(&ctx, LedgerKind::Payable, due_in(dec!(80.00), 12))
        .await
        .expect("payable in 12 days");
    settlement
        .apply(
            &ctx,
            LedgerKind::Payable,
            partly_paid.id,
            ApplyPosting::single(dec!(30.00), PaymentMethod::Pix),
        )
        .await
        .expect("partial payment");
    let canceled = settlement
        .create(&ctx, LedgerKind::Receivable, due_in(dec!(999.00), 12))
        .await
        .expect("receivable to cancel");
    settlement
        .cancel(
            &ctx,
            LedgerKind::Receivable,
            canceled.id,
            CancelDocument {
                reason: "Issued twice".to_string(),
            },
        )
        .await
        .expect("cancel");
    settlement
        .create(&ctx, LedgerKind::Receivable, due_in(dec!(500.00), 45))
        .await
        .expect("receivable beyond the window");

    let projection = settlement.cash_flow(&ctx, None).await.expect("cash flow");
    assert_eq!(projection.days, 30);
    assert_eq!(projection.by_date.len(), 2);

    let first = &projection.by_date[0];
    assert_eq!(first.date, Utc::now().date_naive() + Duration::days(5));
    assert_eq!(first.receivable, dec!(300.00));
    assert_eq!(first.payable, dec!(100.00));
    assert_eq!(first.net, dec!(200.00));

    let second = &projection.by_date[1];
    assert_eq!(second.receivable, Decimal::ZERO);
    assert_eq!(second.payable, dec!(50.00));

    assert_eq!(projection.receivable_total, dec!(300.00));
    assert_eq!(projection.payable_total, dec!(150.00));
    assert_eq!(projection.net, dec!(150.00));

    let wider = settlement.cash_flow(&ctx, Some(60)).await.expect("wider window");
    assert_eq!(wider.receivable_total, dec!(800.00));

    assert_matches!(
        settlement.cash_flow(&ctx, Some(0)).await,
        Err(ServiceError::ValidationError(_))
    );
}
