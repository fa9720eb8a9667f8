//! Receivables and payables share these handlers; the router for each kind
//! injects its [`LedgerKind`] as an extension.

use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    context::RequestContext,
    db::PageRequest,
    entities::ledger_document::LedgerKind,
    errors::ApiError,
    handlers::common::{
        created_response, page_response, page_window, success_response, success_with_message,
    },
    services::settlement::{
        ApplyPosting, CancelDocument, CashFlowProjection, CashFlowQuery, CreateDocument,
        DocumentDetail, DocumentFilters, DocumentPatch, LedgerSummary, Reconciliation,
        RescheduleDocument, SettlementResult,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/{kind}",
    params(("kind" = String, Path, description = "`receivables` or `payables`")),
    request_body = CreateDocument,
    responses(
        (status = 201, description = "Document created", body = crate::entities::ledger_document::Model),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant or user", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate document number", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn create_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Json(payload): Json<CreateDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .services
        .settlement
        .create(&ctx, kind, payload)
        .await?;
    Ok(created_response(document))
}

#[utoipa::path(
    get,
    path = "/api/v1/{kind}",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        PageRequest,
        DocumentFilters
    ),
    responses(
        (status = 200, description = "Paginated documents"),
        (status = 401, description = "Missing tenant or user", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Query(page): Query<PageRequest>,
    Query(filters): Query<DocumentFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let window = page_window(&state, page);
    let documents = state
        .services
        .settlement
        .list(&ctx, kind, &filters, window)
        .await?;
    Ok(page_response(documents))
}

#[utoipa::path(
    get,
    path = "/api/v1/{kind}/summary",
    params(("kind" = String, Path, description = "`receivables` or `payables`")),
    responses(
        (status = 200, description = "Open, overdue and settled totals", body = LedgerSummary)
    ),
    tag = "ledger"
)]
pub async fn ledger_summary(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.services.settlement.summary(&ctx, kind).await?;
    Ok(success_response(summary))
}

/// Both ledger prefixes serve the same projection.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/cash-flow",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        CashFlowQuery
    ),
    responses(
        (status = 200, description = "Open balances by due date", body = CashFlowProjection),
        (status = 400, description = "Window out of range", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn cash_flow(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CashFlowQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let projection = state.services.settlement.cash_flow(&ctx, query.days).await?;
    Ok(success_response(projection))
}

#[utoipa::path(
    get,
    path = "/api/v1/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        ("id" = Uuid, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Document with postings", body = DocumentDetail),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn get_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.services.settlement.get(&ctx, kind, id).await?;
    Ok(success_response(detail))
}

#[utoipa::path(
    patch,
    path = "/api/v1/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        ("id" = Uuid, Path, description = "Document id")
    ),
    request_body = DocumentPatch,
    responses(
        (status = 200, description = "Document updated", body = crate::entities::ledger_document::Model),
        (status = 400, description = "Invalid or empty patch", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Document is not open", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn update_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<DocumentPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .services
        .settlement
        .update(&ctx, kind, id, patch)
        .await?;
    Ok(success_response(document))
}

#[utoipa::path(
    post,
    path = "/api/v1/{kind}/{id}/settle",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        ("id" = Uuid, Path, description = "Document id")
    ),
    request_body = ApplyPosting,
    responses(
        (status = 200, description = "Posting applied", body = SettlementResult),
        (status = 400, description = "Invalid posting", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Document already settled or canceled", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn settle_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyPosting>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .settlement
        .apply(&ctx, kind, id, payload)
        .await?;
    let message = result.message();
    Ok(success_with_message(result, message))
}

#[utoipa::path(
    post,
    path = "/api/v1/{kind}/{id}/cancel",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        ("id" = Uuid, Path, description = "Document id")
    ),
    request_body = CancelDocument,
    responses(
        (status = 200, description = "Document canceled", body = crate::entities::ledger_document::Model),
        (status = 409, description = "Document is not open", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn cancel_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .services
        .settlement
        .cancel(&ctx, kind, id, payload)
        .await?;
    Ok(success_with_message(document, "Document canceled"))
}

#[utoipa::path(
    post,
    path = "/api/v1/{kind}/{id}/reschedule",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        ("id" = Uuid, Path, description = "Document id")
    ),
    request_body = RescheduleDocument,
    responses(
        (status = 200, description = "Due date moved", body = crate::entities::ledger_document::Model),
        (status = 409, description = "Document is not open", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn reschedule_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RescheduleDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .services
        .settlement
        .reschedule(&ctx, kind, id, payload)
        .await?;
    Ok(success_response(document))
}

#[utoipa::path(
    get,
    path = "/api/v1/{kind}/{id}/reconciliation",
    params(
        ("kind" = String, Path, description = "`receivables` or `payables`"),
        ("id" = Uuid, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Stored vs recomputed balance", body = Reconciliation),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn reconcile_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reconciliation = state.services.settlement.reconcile(&ctx, kind, id).await?;
    Ok(success_response(reconciliation))
}

pub fn ledger_routes(kind: LedgerKind) -> Router<AppState> {
    Router::new()
        .route("/", post(create_document).get(list_documents))
        .route("/summary", get(ledger_summary))
        .route("/cash-flow", get(cash_flow))
        .route("/:id", get(get_document).patch(update_document))
        .route("/:id/settle", post(settle_document))
        .route("/:id/cancel", post(cancel_document))
        .route("/:id/reschedule", post(reschedule_document))
        .route("/:id/reconciliation", get(reconcile_document))
        .layer(Extension(kind))
}
