use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    context::RequestContext,
    db::PageRequest,
    errors::ApiError,
    handlers::common::{
        created_response, page_response, page_window, success_response, success_with_message,
    },
    services::inventory_counts::{
        AdjustmentResult, CancelCount, CountDetail, CountFilters, CreateInventoryCount,
        GenerateLines, GeneratedLines, InventoryCountSummary, LineFilters, RecordCount,
        RecordCounts,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts",
    request_body = CreateInventoryCount,
    responses(
        (status = 201, description = "Count created in DRAFT", body = crate::entities::inventory_count::Model),
        (status = 404, description = "Location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Another count is in progress at the location", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn create_count(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateInventoryCount>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .services
        .inventory_counts
        .create(&ctx, payload)
        .await?;
    Ok(created_response(count))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory-counts",
    params(PageRequest, CountFilters),
    responses((status = 200, description = "Paginated counts")),
    tag = "inventory"
)]
pub async fn list_counts(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(page): Query<PageRequest>,
    Query(filters): Query<CountFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let window = page_window(&state, page);
    let counts = state
        .services
        .inventory_counts
        .list(&ctx, &filters, window)
        .await?;
    Ok(page_response(counts))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory-counts/summary",
    responses((status = 200, description = "Counts per status", body = InventoryCountSummary)),
    tag = "inventory"
)]
pub async fn counts_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.services.inventory_counts.summary(&ctx).await?;
    Ok(success_response(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory-counts/{id}",
    params(("id" = Uuid, Path, description = "Count id")),
    responses(
        (status = 200, description = "Count with line statistics", body = CountDetail),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_count(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.services.inventory_counts.get(&ctx, id).await?;
    Ok(success_response(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/lines",
    params(("id" = Uuid, Path, description = "Count id")),
    request_body = GenerateLines,
    responses(
        (status = 200, description = "Snapshot replaced", body = GeneratedLines),
        (status = 409, description = "Count is not in DRAFT", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn generate_lines(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<GenerateLines>,
) -> Result<impl IntoResponse, ApiError> {
    let generated = state
        .services
        .inventory_counts
        .generate_lines(&ctx, id, payload)
        .await?;
    let message = format!("{} lines generated", generated.lines_generated);
    Ok(success_with_message(generated, message))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory-counts/{id}/lines",
    params(("id" = Uuid, Path, description = "Count id"), PageRequest, LineFilters),
    responses((status = 200, description = "Paginated count lines")),
    tag = "inventory"
)]
pub async fn list_lines(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Query(page): Query<PageRequest>,
    Query(filters): Query<LineFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let window = page_window(&state, page);
    let lines = state
        .services
        .inventory_counts
        .list_lines(&ctx, id, &filters, window)
        .await?;
    Ok(page_response(lines))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/start",
    params(("id" = Uuid, Path, description = "Count id")),
    responses(
        (status = 200, description = "Count moved to COUNTING", body = crate::entities::inventory_count::Model),
        (status = 422, description = "Count has no lines", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn start_count(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.services.inventory_counts.start(&ctx, id).await?;
    Ok(success_response(count))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/counts",
    params(("id" = Uuid, Path, description = "Count id")),
    request_body = RecordCount,
    responses(
        (status = 200, description = "Count recorded", body = crate::entities::inventory_count_line::Model),
        (status = 404, description = "Product not in this count", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn record_count(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordCount>,
) -> Result<impl IntoResponse, ApiError> {
    let line = state
        .services
        .inventory_counts
        .record_count(&ctx, id, payload)
        .await?;
    Ok(success_response(line))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/counts/batch",
    params(("id" = Uuid, Path, description = "Count id")),
    request_body = RecordCounts,
    responses(
        (status = 200, description = "All counts recorded"),
        (status = 404, description = "A product is not in this count", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn record_counts(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordCounts>,
) -> Result<impl IntoResponse, ApiError> {
    let lines = state
        .services
        .inventory_counts
        .record_counts(&ctx, id, payload)
        .await?;
    let message = format!("{} counts recorded", lines.len());
    Ok(success_with_message(lines, message))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/finalize",
    params(("id" = Uuid, Path, description = "Count id")),
    responses(
        (status = 200, description = "Count finalized", body = crate::entities::inventory_count::Model),
        (status = 422, description = "Some lines have no count", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn finalize_count(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.services.inventory_counts.finalize(&ctx, id).await?;
    Ok(success_response(count))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/adjust-stock",
    params(("id" = Uuid, Path, description = "Count id")),
    responses(
        (status = 200, description = "Stock adjusted", body = AdjustmentResult),
        (status = 422, description = "Nothing to adjust", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .inventory_counts
        .adjust_stock(&ctx, id)
        .await?;
    let message = format!(
        "{} stock movements created; divergence value {}",
        result.movements.len(),
        result.divergence_value
    );
    Ok(success_with_message(result, message))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory-counts/{id}/cancel",
    params(("id" = Uuid, Path, description = "Count id")),
    request_body = CancelCount,
    responses(
        (status = 200, description = "Count canceled", body = crate::entities::inventory_count::Model),
        (status = 409, description = "Count already finalized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn cancel_count(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelCount>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .services
        .inventory_counts
        .cancel(&ctx, id, payload)
        .await?;
    Ok(success_with_message(count, "Inventory count canceled"))
}

pub fn inventory_count_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_count).get(list_counts))
        .route("/summary", get(counts_summary))
        .route("/:id", get(get_count))
        .route("/:id/lines", post(generate_lines).get(list_lines))
        .route("/:id/start", post(start_count))
        .route("/:id/counts", post(record_count))
        .route("/:id/counts/batch", post(record_counts))
        .route("/:id/finalize", post(finalize_count))
        .route("/:id/adjust-stock", post(adjust_stock))
        .route("/:id/cancel", post(cancel_count))
}
