//! HTTP handlers.

pub mod download;
pub mod fs;
pub mod multistatus;
pub mod proxy;
pub mod webdav;

use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET /healthz - liveness probe.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
