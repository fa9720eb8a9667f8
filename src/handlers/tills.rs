use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::{
    context::RequestContext,
    db::PageRequest,
    errors::ApiError,
    handlers::common::{created_response, page_response, page_window, success_response},
    services::tills::{CreateTill, TillFilters, TillPatch},
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/tills",
    request_body = CreateTill,
    responses(
        (status = 201, description = "Till created", body = crate::entities::till::Model),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn create_till(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateTill>,
) -> Result<impl IntoResponse, ApiError> {
    let till = state.services.tills.create(&ctx, payload).await?;
    Ok(created_response(till))
}

#[utoipa::path(
    get,
    path = "/api/v1/tills",
    params(PageRequest, TillFilters),
    responses((status = 200, description = "Paginated tills")),
    tag = "cash"
)]
pub async fn list_tills(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(page): Query<PageRequest>,
    Query(filters): Query<TillFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let window = page_window(&state, page);
    let tills = state.services.tills.list(&ctx, &filters, window).await?;
    Ok(page_response(tills))
}

#[utoipa::path(
    get,
    path = "/api/v1/tills/{id}",
    params(("id" = Uuid, Path, description = "Till id")),
    responses(
        (status = 200, description = "Till", body = crate::entities::till::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn get_till(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let till = state.services.tills.get(&ctx, id).await?;
    Ok(success_response(till))
}

#[utoipa::path(
    patch,
    path = "/api/v1/tills/{id}",
    params(("id" = Uuid, Path, description = "Till id")),
    request_body = TillPatch,
    responses(
        (status = 200, description = "Till updated", body = crate::entities::till::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn update_till(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<TillPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let till = state.services.tills.update(&ctx, id, patch).await?;
    Ok(success_response(till))
}

pub fn till_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tills).post(create_till))
        .route("/:id", get(get_till).patch(update_till))
}
