#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use planac_erp::{
    config::AppConfig,
    context::{RequestContext, TENANT_HEADER, USER_HEADER},
    db,
    entities::{product, stock_level, stock_location, till},
    AppState,
};

/// Application state over a fresh in-memory SQLite store, one tenant and one
/// operator per harness.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // In-memory SQLite is per connection; keep exactly one alive.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = planac_erp::app_router(state.clone());

        Self {
            router,
            state,
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::new(self.tenant_id, self.user_id)
    }

    /// Same tenant, different operator.
    pub fn other_operator(&self) -> RequestContext {
        RequestContext::new(self.tenant_id, Uuid::new_v4())
    }

    pub fn db(&self) -> &db::DbPool {
        self.state.db.as_ref()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, String)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Request carrying the harness tenant and operator headers.
    pub async fn request_as_tenant(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(
            method,
            uri,
            body,
            &[
                (TENANT_HEADER, self.tenant_id.to_string()),
                (USER_HEADER, self.user_id.to_string()),
            ],
        )
        .await
    }

    pub async fn seed_till(&self, withdrawal_limit: Option<Decimal>) -> till::Model {
        let now = Utc::now();
        till::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            branch_id: Set(None),
            name: Set("Front till".to_string()),
            bank_account_id: Set(Some(Uuid::new_v4())),
            withdrawal_limit: Set(withdrawal_limit),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed till")
    }

    pub async fn seed_location(&self) -> stock_location::Model {
        stock_location::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            branch_id: Set(None),
            name: Set("Main warehouse".to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed location")
    }

    pub async fn seed_product(&self, sku: &str, cost_price: Decimal) -> product::Model {
        self.seed_classified_product(sku, cost_price, None, None).await
    }

    pub async fn seed_classified_product(
        &self,
        sku: &str,
        cost_price: Decimal,
        category_id: Option<Uuid>,
        brand_id: Option<Uuid>,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {sku}")),
            category_id: Set(category_id),
            brand_id: Set(brand_id),
            cost_price: Set(cost_price),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_stock(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    ) -> stock_level::Model {
        stock_level::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            product_id: Set(product_id),
            location_id: Set(location_id),
            quantity: Set(quantity),
            average_cost: Set(None),
            updated_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed stock level")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}

/// Decimals come back as JSON strings or numbers depending on the backend.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
