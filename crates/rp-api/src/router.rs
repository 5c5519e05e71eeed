//! Top-level route table.

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};

use crate::{flow, state::ApiState};

/// Health check, login flow routes and a plaintext 404 fallback.
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health))
        .merge(flow::routes())
        .fallback(handler_404)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}
