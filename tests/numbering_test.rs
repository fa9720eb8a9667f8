mod common;

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use futures::future::join_all;
use uuid::Uuid;

use planac_erp::{
    errors::ServiceError,
    services::numbering::{try_claim, ConfigureSequence, SequenceKey},
};

use common::TestApp;

#[tokio::test]
async fn numbers_are_sequential_per_sequence() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let numbering = &app.state.services.numbering;

    let first = numbering.next(&ctx, "order", None).await.expect("first");
    let second = numbering.next(&ctx, "ORDER", None).await.expect("second");
    assert_eq!(first.doc_type, "ORDER");
    assert_eq!(first.number, 1);
    assert_eq!(second.number, 2);
    assert_eq!(second.formatted, "000002");

    // Another document type and another branch each start over
    let other_type = numbering.next(&ctx, "QUOTE", None).await.expect("quote");
    assert_eq!(other_type.number, 1);
    let branch = Uuid::new_v4();
    let branch_number = numbering
        .next(&ctx, "ORDER", Some(branch))
        .await
        .expect("branch order");
    assert_eq!(branch_number.number, 1);
    assert_eq!(branch_number.branch_scope, branch.to_string());
}

#[tokio::test]
async fn preview_does_not_consume() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let numbering = &app.state.services.numbering;

    let preview = numbering.preview(&ctx, "INVOICE", None).await.expect("preview");
    assert_eq!(preview.next_number, 1);
    let again = numbering.preview(&ctx, "INVOICE", None).await.expect("preview");
    assert_eq!(again.next_number, 1);

    let allocated = numbering.next(&ctx, "INVOICE", None).await.expect("next");
    assert_eq!(allocated.formatted, preview.formatted);
}

#[tokio::test]
async fn configured_format_and_start_are_applied() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let numbering = &app.state.services.numbering;

    numbering
        .configure(
            &ctx,
            "receipt",
            ConfigureSequence {
                prefix: "RC-".to_string(),
                suffix: "/26".to_string(),
                width: Some(4),
                start_after: 99,
                ..Default::default()
            },
        )
        .await
        .expect("configure");

    let allocated = numbering.next(&ctx, "RECEIPT", None).await.expect("next");
    assert_eq!(allocated.number, 100);
    assert_eq!(allocated.formatted, "RC-0100/26");

    // Branches without their own settings inherit the tenant-wide format
    let branch = numbering
        .next(&ctx, "RECEIPT", Some(Uuid::new_v4()))
        .await
        .expect("branch next");
    assert_eq!(branch.formatted, "RC-0100/26");

    let settings = numbering.list_settings(&ctx).await.expect("settings");
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].doc_type, "RECEIPT");
}

#[tokio::test]
async fn invalid_document_types_are_rejected() {
    let app = TestApp::new().await;
    let ctx = app.ctx();

    let result = app.state.services.numbering.next(&ctx, "bad-type!", None).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn claimed_numbers_cannot_be_claimed_twice() {
    let app = TestApp::new().await;
    let key = SequenceKey::new(app.tenant_id, "ORDER", None).expect("key");

    assert!(try_claim(app.db(), &key, 7, "000007").await.expect("first claim"));
    assert!(!try_claim(app.db(), &key, 7, "000007").await.expect("second claim"));
}

#[tokio::test]
async fn concurrent_allocations_are_distinct_and_contiguous() {
    let app = TestApp::new().await;
    let ctx = app.ctx();
    let numbering = app.state.services.numbering.clone();

    let calls = (0..4).map(|_| {
        let numbering = numbering.clone();
        let ctx = ctx.clone();
        async move { numbering.next(&ctx, "ORDER", None).await }
    });
    let numbers: BTreeSet<i64> = join_all(calls)
        .await
        .into_iter()
        .map(|result| result.expect("allocation").number)
        .collect();

    assert_eq!(numbers, (1..=4).collect::<BTreeSet<i64>>());
}
