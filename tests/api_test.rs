mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{assert_status, decimal, response_json, TestApp};

fn receivable_payload(amount: &str) -> serde_json::Value {
    json!({
        "counterparty_id": uuid::Uuid::new_v4(),
        "document_type": "TRADE_BILL",
        "due_date": (Utc::now().date_naive() + Duration::days(10)).to_string(),
        "original_amount": amount,
    })
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, &[]).await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "healthy");
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/receivables", None, &[])
        .await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            "/health",
            None,
            &[("x-request-id", "trace-42".to_string())],
        )
        .await;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-42")
    );

    let generated = app.request(Method::GET, "/health", None, &[]).await;
    assert!(generated.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn settle_through_the_api() {
    let app = TestApp::new().await;

    let response = app
        .request_as_tenant(
            Method::POST,
            "/api/v1/receivables",
            Some(receivable_payload("1000.00")),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);
    let created = response_json(response).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["status"], "OPEN");
    assert!(created["meta"]["timestamp"].is_string());
    let id = created["data"]["id"].as_str().expect("document id").to_string();

    let response = app
        .request_as_tenant(
            Method::POST,
            &format!("/api/v1/receivables/{id}/settle"),
            Some(json!({
                "applied_amount": "400.00",
                "breakdown": [{ "payment_method": "PIX", "amount": "400.00" }],
            })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let settled = response_json(response).await;
    assert_eq!(settled["data"]["new_status"], "OPEN");
    assert_eq!(decimal(&settled["data"]["new_balance"]), dec!(600.00));
    assert!(settled["message"]
        .as_str()
        .expect("message")
        .starts_with("Partially settled"));

    // The same document is not visible as a payable
    let response = app
        .request_as_tenant(Method::GET, &format!("/api/v1/payables/{id}"), None)
        .await;
    assert_status(&response, StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let app = TestApp::new().await;

    let mut payload = receivable_payload("10.00");
    payload["balance"] = json!("0.00");
    let response = app
        .request_as_tenant(Method::POST, "/api/v1/receivables", Some(payload))
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn lists_follow_the_pagination_contract() {
    let app = TestApp::new().await;

    for amount in ["10.00", "20.00", "30.00"] {
        let response = app
            .request_as_tenant(
                Method::POST,
                "/api/v1/receivables",
                Some(receivable_payload(amount)),
            )
            .await;
        assert_status(&response, StatusCode::CREATED);
    }

    let response = app
        .request_as_tenant(Method::GET, "/api/v1/receivables?page=2&limit=2", None)
        .await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["limit"], 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["pages"], 2);
}

#[tokio::test]
async fn insufficient_funds_maps_to_unprocessable_entity() {
    let app = TestApp::new().await;
    let till = app.seed_till(None).await;

    let response = app
        .request_as_tenant(
            Method::POST,
            "/api/v1/cash-sessions/open",
            Some(json!({ "till_id": till.id, "opening_amount": "120.00" })),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);
    let session = response_json(response).await;
    let session_id = session["data"]["id"].as_str().expect("session id").to_string();

    let response = app
        .request_as_tenant(
            Method::POST,
            &format!("/api/v1/cash-sessions/{session_id}/withdrawals"),
            Some(json!({ "amount": "500.00" })),
        )
        .await;
    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "insufficient_funds");
    assert!(body["request_id"].is_string());

    let response = app
        .request_as_tenant(Method::GET, "/api/v1/cash-sessions/current", None)
        .await;
    assert_status(&response, StatusCode::OK);
    let current = response_json(response).await;
    assert_eq!(decimal(&current["data"]["cash_balance"]), dec!(120.00));
}

#[tokio::test]
async fn audit_trail_is_searchable() {
    let app = TestApp::new().await;

    let response = app
        .request_as_tenant(
            Method::POST,
            "/api/v1/receivables",
            Some(receivable_payload("15.00")),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);

    let response = app
        .request_as_tenant(
            Method::GET,
            "/api/v1/audit-logs?table_name=receivables&action=CREATE",
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["action"], "CREATE");
}

#[tokio::test]
async fn cash_flow_is_served_under_both_ledgers() {
    let app = TestApp::new().await;

    let response = app
        .request_as_tenant(
            Method::POST,
            "/api/v1/receivables",
            Some(receivable_payload("75.00")),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);

    for uri in [
        "/api/v1/receivables/cash-flow?days=15",
        "/api/v1/payables/cash-flow?days=15",
    ] {
        let response = app.request_as_tenant(Method::GET, uri, None).await;
        assert_status(&response, StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"]["days"], 15);
        assert_eq!(decimal(&body["data"]["receivable_total"]), dec!(75.00));
        assert_eq!(body["data"]["by_date"].as_array().map(Vec::len), Some(1));
    }

    let response = app
        .request_as_tenant(Method::GET, "/api/v1/payables/cash-flow?days=0", None)
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}
