use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::{
    context::RequestContext,
    db::PageRequest,
    errors::ApiError,
    handlers::common::{page_response, page_window},
    services::audit::AuditLogFilters,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/audit-logs",
    params(PageRequest, AuditLogFilters),
    responses(
        (status = 200, description = "Audit entries, newest first"),
        (status = 401, description = "Missing tenant or user", body = crate::errors::ErrorResponse)
    ),
    tag = "audit"
)]
pub async fn search_audit_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(page): Query<PageRequest>,
    Query(filters): Query<AuditLogFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let window = page_window(&state, page);
    let entries = state.services.audit.search(&ctx, &filters, window).await?;
    Ok(page_response(entries))
}

pub fn audit_log_routes() -> Router<AppState> {
    Router::new().route("/", get(search_audit_logs))
}
