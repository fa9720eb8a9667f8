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
    services::cash_sessions::{
        CashSale, CashSupply, CashWithdrawal, CloseResult, CloseSession, MovementReceipt,
        OpenSession, SessionDetail, SessionFilters, SessionOverview,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/cash-sessions/open",
    request_body = OpenSession,
    responses(
        (status = 201, description = "Session opened", body = crate::entities::cash_session::Model),
        (status = 404, description = "Till not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Till or operator already has an open session", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn open_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<OpenSession>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.services.cash_sessions.open(&ctx, payload).await?;
    Ok(created_response(session))
}

#[utoipa::path(
    get,
    path = "/api/v1/cash-sessions/current",
    responses(
        (status = 200, description = "Caller's open session with live balances", body = SessionOverview),
        (status = 404, description = "No open session", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn current_session(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let overview = state.services.cash_sessions.current_session(&ctx).await?;
    Ok(success_response(overview))
}

#[utoipa::path(
    post,
    path = "/api/v1/cash-sessions/current/close",
    request_body = CloseSession,
    responses(
        (status = 200, description = "Session closed", body = CloseResult),
        (status = 404, description = "No open session", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn close_current_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CloseSession>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .cash_sessions
        .close_current(&ctx, payload)
        .await?;
    let message = result.message();
    Ok(success_with_message(result, message))
}

#[utoipa::path(
    get,
    path = "/api/v1/cash-sessions",
    params(PageRequest, SessionFilters),
    responses((status = 200, description = "Paginated session history")),
    tag = "cash"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(page): Query<PageRequest>,
    Query(filters): Query<SessionFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let window = page_window(&state, page);
    let sessions = state
        .services
        .cash_sessions
        .list(&ctx, &filters, window)
        .await?;
    Ok(page_response(sessions))
}

#[utoipa::path(
    get,
    path = "/api/v1/cash-sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session with movements and closing lines", body = SessionDetail),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn get_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.services.cash_sessions.get(&ctx, id).await?;
    Ok(success_response(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/cash-sessions/{id}/supplies",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = CashSupply,
    responses(
        (status = 201, description = "Supply posted", body = MovementReceipt),
        (status = 409, description = "Session is closed", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn post_supply(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CashSupply>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .services
        .cash_sessions
        .post_supply(&ctx, id, payload)
        .await?;
    Ok(created_response(receipt))
}

#[utoipa::path(
    post,
    path = "/api/v1/cash-sessions/{id}/withdrawals",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = CashWithdrawal,
    responses(
        (status = 201, description = "Withdrawal posted", body = MovementReceipt),
        (status = 409, description = "Session is closed", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient cash or above the till limit", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn post_withdrawal(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CashWithdrawal>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .services
        .cash_sessions
        .post_withdrawal(&ctx, id, payload)
        .await?;
    Ok(created_response(receipt))
}

#[utoipa::path(
    post,
    path = "/api/v1/cash-sessions/{id}/sales",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = CashSale,
    responses(
        (status = 201, description = "Sale recorded", body = MovementReceipt),
        (status = 409, description = "Session is closed", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn record_sale(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CashSale>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .services
        .cash_sessions
        .record_sale(&ctx, id, payload)
        .await?;
    Ok(created_response(receipt))
}

#[utoipa::path(
    post,
    path = "/api/v1/cash-sessions/{id}/close",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = CloseSession,
    responses(
        (status = 200, description = "Session closed", body = CloseResult),
        (status = 409, description = "Session is already closed", body = crate::errors::ErrorResponse)
    ),
    tag = "cash"
)]
pub async fn close_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CloseSession>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .cash_sessions
        .close(&ctx, id, payload)
        .await?;
    let message = result.message();
    Ok(success_with_message(result, message))
}

pub fn cash_session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/open", post(open_session))
        .route("/current", get(current_session))
        .route("/current/close", post(close_current_session))
        .route("/:id", get(get_session))
        .route("/:id/supplies", post(post_supply))
        .route("/:id/withdrawals", post(post_withdrawal))
        .route("/:id/sales", post(record_sale))
        .route("/:id/close", post(close_session))
}
