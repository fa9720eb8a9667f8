mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use planac_erp::{
    db::PageWindow,
    entities::{
        inventory_count::{CountStatus, CountType},
        stock_level, stock_movement, FlowDirection,
    },
    errors::ServiceError,
    services::inventory_counts::{
        CancelCount, CreateInventoryCount, GenerateLines, LineFilters, LineState, RecordCount,
        RecordCounts,
    },
};

use common::TestApp;

fn full_count(location_id: Uuid) -> CreateInventoryCount {
    CreateInventoryCount {
        location_id,
        count_type: CountType::Full,
        responsible_id: None,
        description: Some("Quarter close".to_string()),
    }
}

fn counted(product_id: Uuid, quantity: Decimal) -> RecordCount {
    RecordCount {
        product_id,
        counted_quantity: quantity,
        lot: None,
        expiry_date: None,
        note: None,
    }
}

async fn live_quantity(app: &TestApp, product_id: Uuid, location_id: Uuid) -> Decimal {
    stock_level::Entity::find()
        .filter(stock_level::Column::ProductId.eq(product_id))
        .filter(stock_level::Column::LocationId.eq(location_id))
        .one(app.db())
        .await
        .expect("query stock level")
        .map(|level| level.quantity)
        .unwrap_or_default()
}

#[tokio::test]
async fn count_reconciles_divergent_lines() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let counts = &app.state.services.inventory_counts;

    let location = app.seed_location().await;
    let steady = app.seed_product("SKU-A", dec!(4.00)).await;
    let short = app.seed_product("SKU-B", dec!(10.00)).await;
    let surplus = app.seed_product("SKU-C", dec!(2.50)).await;
    app.seed_stock(steady.id, location.id, dec!(10)).await;
    app.seed_stock(short.id, location.id, dec!(5)).await;
    // SKU-C has never been stocked here and snapshots as zero

    let count = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("create count");
    assert_eq!(count.status, CountStatus::Draft);
    assert_eq!(count.number, "000001");

    let generated = counts
        .generate_lines(&ctx, count.id, GenerateLines::default())
        .await
        .expect("generate lines");
    assert_eq!(generated.lines_generated, 3);

    let started = counts.start(&ctx, count.id).await.expect("start count");
    assert_eq!(started.status, CountStatus::Counting);
    assert!(started.started_at.is_some());

    counts
        .record_counts(
            &ctx,
            count.id,
            RecordCounts {
                items: vec![
                    counted(steady.id, dec!(10)),
                    counted(short.id, dec!(3)),
                    counted(surplus.id, dec!(2)),
                ],
            },
        )
        .await
        .expect("record counts");

    let divergent = counts
        .list_lines(
            &ctx,
            count.id,
            &LineFilters {
                state: Some(LineState::Divergent),
            },
            PageWindow { page: 1, limit: 50 },
        )
        .await
        .expect("divergent lines");
    assert_eq!(divergent.pagination.total, 2);

    let finalized = counts.finalize(&ctx, count.id).await.expect("finalize");
    assert_eq!(finalized.status, CountStatus::Finalized);

    let adjusted = counts.adjust_stock(&ctx, count.id).await.expect("adjust stock");
    assert_eq!(adjusted.count.status, CountStatus::Adjusted);
    assert_eq!(adjusted.movements.len(), 2);
    // (3 - 5) * 10.00 + (2 - 0) * 2.50
    assert_eq!(adjusted.divergence_value, dec!(-15.00));

    let out = adjusted
        .movements
        .iter()
        .find(|m| m.product_id == short.id)
        .expect("movement for the short line");
    assert_eq!(out.direction, FlowDirection::Out);
    assert_eq!(out.quantity, dec!(2));
    assert_eq!(out.quantity_before, dec!(5));
    assert_eq!(out.quantity_after, dec!(3));
    assert_eq!(out.trace_tag, count.number);

    let inbound = adjusted
        .movements
        .iter()
        .find(|m| m.product_id == surplus.id)
        .expect("movement for the surplus line");
    assert_eq!(inbound.direction, FlowDirection::In);
    assert_eq!(inbound.quantity, dec!(2));

    // Signed movement equals counted minus snapshot, and live stock equals the count
    for movement in &adjusted.movements {
        assert_eq!(
            movement.direction.signed(movement.quantity),
            movement.quantity_after - movement.quantity_before
        );
    }
    assert_eq!(live_quantity(&app, steady.id, location.id).await, dec!(10));
    assert_eq!(live_quantity(&app, short.id, location.id).await, dec!(3));
    assert_eq!(live_quantity(&app, surplus.id, location.id).await, dec!(2));

    let untouched = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(steady.id))
        .all(app.db())
        .await
        .expect("query movements");
    assert!(untouched.is_empty());

    // Adjusting twice is not allowed
    assert_matches!(
        counts.adjust_stock(&ctx, count.id).await,
        Err(ServiceError::InvalidState(_))
    );
}

#[tokio::test]
async fn finalize_requires_every_line_counted() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let counts = &app.state.services.inventory_counts;

    let location = app.seed_location().await;
    let first = app.seed_product("SKU-1", dec!(1.00)).await;
    app.seed_product("SKU-2", dec!(1.00)).await;

    let count = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("create count");

    assert_matches!(
        counts.start(&ctx, count.id).await,
        Err(ServiceError::Precondition(_))
    );

    counts
        .generate_lines(&ctx, count.id, GenerateLines::default())
        .await
        .expect("generate lines");
    counts.start(&ctx, count.id).await.expect("start");
    counts
        .record_count(&ctx, count.id, counted(first.id, dec!(1)))
        .await
        .expect("record one count");

    let result = counts.finalize(&ctx, count.id).await;
    assert_matches!(result, Err(ServiceError::Precondition(msg)) if msg.contains("1 items have no count"));

    let unknown = counts
        .record_count(&ctx, count.id, counted(Uuid::new_v4(), dec!(1)))
        .await;
    assert_matches!(unknown, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn one_active_count_per_location() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let counts = &app.state.services.inventory_counts;
    let location = app.seed_location().await;

    let first = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("create count");
    assert_matches!(
        counts.create(&ctx, full_count(location.id)).await,
        Err(ServiceError::Conflict(_))
    );

    let canceled = counts
        .cancel(
            &ctx,
            first.id,
            CancelCount {
                reason: "Started by mistake".to_string(),
            },
        )
        .await
        .expect("cancel count");
    assert_eq!(canceled.status, CountStatus::Canceled);
    assert_eq!(canceled.cancel_reason.as_deref(), Some("Started by mistake"));

    let second = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("location is free after cancel");
    assert_eq!(second.number, "000002");

    let summary = counts.summary(&ctx).await.expect("summary");
    assert_eq!(summary.in_progress, 1);
}

#[tokio::test]
async fn batch_with_duplicate_products_is_rejected_whole() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let counts = &app.state.services.inventory_counts;

    let location = app.seed_location().await;
    let product = app.seed_product("SKU-X", dec!(3.00)).await;
    app.seed_stock(product.id, location.id, dec!(7)).await;

    let count = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("create count");
    counts
        .generate_lines(&ctx, count.id, GenerateLines::default())
        .await
        .expect("generate lines");
    counts.start(&ctx, count.id).await.expect("start");

    let result = counts
        .record_counts(
            &ctx,
            count.id,
            RecordCounts {
                items: vec![counted(product.id, dec!(6)), counted(product.id, dec!(7))],
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let detail = counts.get(&ctx, count.id).await.expect("count detail");
    assert_eq!(detail.stats.counted_lines, 0);
    assert_eq!(detail.stats.pending_lines, 1);
}

#[tokio::test]
async fn regenerating_lines_replaces_the_snapshot() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let counts = &app.state.services.inventory_counts;

    let location = app.seed_location().await;
    let beverages = Uuid::new_v4();
    let snacks = Uuid::new_v4();
    let house_brand = Uuid::new_v4();
    let stocked = app
        .seed_classified_product("BEV-1", dec!(2.00), Some(beverages), None)
        .await;
    app.seed_classified_product("BEV-2", dec!(2.00), Some(beverages), None)
        .await;
    let branded = app
        .seed_classified_product("SNK-1", dec!(1.00), Some(snacks), Some(house_brand))
        .await;
    app.seed_stock(stocked.id, location.id, dec!(5)).await;
    app.seed_stock(branded.id, location.id, dec!(3)).await;

    let count = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("create count");

    let by_category = counts
        .generate_lines(
            &ctx,
            count.id,
            GenerateLines {
                category_id: Some(beverages),
                ..Default::default()
            },
        )
        .await
        .expect("generate by category");
    assert_eq!(by_category.lines_generated, 2);

    let in_stock = counts
        .generate_lines(
            &ctx,
            count.id,
            GenerateLines {
                category_id: Some(beverages),
                only_in_stock: true,
                ..Default::default()
            },
        )
        .await
        .expect("regenerate in stock only");
    assert_eq!(in_stock.lines_generated, 1);
    let detail = counts.get(&ctx, count.id).await.expect("count detail");
    assert_eq!(detail.stats.total_lines, 1);

    counts
        .generate_lines(
            &ctx,
            count.id,
            GenerateLines {
                brand_id: Some(house_brand),
                ..Default::default()
            },
        )
        .await
        .expect("regenerate by brand");
    let lines = counts
        .list_lines(
            &ctx,
            count.id,
            &LineFilters::default(),
            PageWindow { page: 1, limit: 50 },
        )
        .await
        .expect("list lines");
    assert_eq!(lines.pagination.total, 1);
    assert_eq!(lines.data[0].product_id, branded.id);
    assert_eq!(lines.data[0].system_quantity, dec!(3));
}

#[tokio::test]
async fn adjusting_a_count_without_divergence_is_refused() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let counts = &app.state.services.inventory_counts;

    let location = app.seed_location().await;
    let product = app.seed_product("SKU-EVEN", dec!(5.00)).await;
    app.seed_stock(product.id, location.id, dec!(4)).await;

    let count = counts
        .create(&ctx, full_count(location.id))
        .await
        .expect("create count");
    counts
        .generate_lines(&ctx, count.id, GenerateLines::default())
        .await
        .expect("generate lines");
    counts.start(&ctx, count.id).await.expect("start");
    counts
        .record_count(&ctx, count.id, counted(product.id, dec!(4)))
        .await
        .expect("record matching count");
    counts.finalize(&ctx, count.id).await.expect("finalize");

    let result = counts.adjust_stock(&ctx, count.id).await;
    assert_matches!(result, Err(ServiceError::Precondition(msg)) if msg == "nothing to adjust");

    let detail = counts.get(&ctx, count.id).await.expect("count detail");
    assert_eq!(detail.count.status, CountStatus::Finalized);
    assert_eq!(live_quantity(&app, product.id, location.id).await, dec!(4));
}
