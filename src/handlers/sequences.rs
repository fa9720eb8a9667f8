use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    context::RequestContext,
    errors::ApiError,
    handlers::common::success_response,
    services::numbering::{Allocation, ConfigureSequence, NumberPreview},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BranchQuery {
    /// Omit for the tenant-wide sequence
    pub branch_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/sequences",
    responses(
        (status = 200, description = "Sequence settings of the tenant", body = [crate::entities::sequence_setting::Model])
    ),
    tag = "numbering"
)]
pub async fn list_sequences(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.services.numbering.list_settings(&ctx).await?;
    Ok(success_response(settings))
}

#[utoipa::path(
    put,
    path = "/api/v1/sequences/{doc_type}",
    params(("doc_type" = String, Path, description = "Upper-case document type, e.g. PURCHASE_ORDER")),
    request_body = ConfigureSequence,
    responses(
        (status = 200, description = "Settings stored", body = crate::entities::sequence_setting::Model),
        (status = 400, description = "Invalid settings", body = crate::errors::ErrorResponse)
    ),
    tag = "numbering"
)]
pub async fn configure_sequence(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(doc_type): Path<String>,
    Json(payload): Json<ConfigureSequence>,
) -> Result<impl IntoResponse, ApiError> {
    let setting = state
        .services
        .numbering
        .configure(&ctx, &doc_type, payload)
        .await?;
    Ok(success_response(setting))
}

#[utoipa::path(
    get,
    path = "/api/v1/sequences/{doc_type}/preview",
    params(("doc_type" = String, Path, description = "Document type"), BranchQuery),
    responses((status = 200, description = "Next number, not consumed", body = NumberPreview)),
    tag = "numbering"
)]
pub async fn preview_number(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(doc_type): Path<String>,
    Query(query): Query<BranchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let preview = state
        .services
        .numbering
        .preview(&ctx, &doc_type, query.branch_id)
        .await?;
    Ok(success_response(preview))
}

#[utoipa::path(
    post,
    path = "/api/v1/sequences/{doc_type}/next",
    params(("doc_type" = String, Path, description = "Document type"), BranchQuery),
    responses(
        (status = 200, description = "Number consumed", body = Allocation),
        (status = 409, description = "Could not claim a number", body = crate::errors::ErrorResponse)
    ),
    tag = "numbering"
)]
pub async fn next_number(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(doc_type): Path<String>,
    Query(query): Query<BranchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let allocation = state
        .services
        .numbering
        .next(&ctx, &doc_type, query.branch_id)
        .await?;
    Ok(success_response(allocation))
}

pub fn sequence_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sequences))
        .route("/:doc_type", put(configure_sequence))
        .route("/:doc_type/preview", get(preview_number))
        .route("/:doc_type/next", post(next_number))
}
