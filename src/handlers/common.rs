use crate::{
    db::{Page, PageRequest, PageWindow},
    ApiResponse, AppState,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 200 with the `{success, data}` envelope.
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub fn success_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// List bodies follow the pagination contract without the envelope.
pub fn page_response<T: Serialize>(page: Page<T>) -> Response {
    (StatusCode::OK, Json(page)).into_response()
}

/// Applies the configured default and maximum page sizes.
pub fn page_window(state: &AppState, request: PageRequest) -> PageWindow {
    request.normalize(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    )
}
