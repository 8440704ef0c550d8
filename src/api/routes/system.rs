//! System handlers: health, capabilities, proxy status, OpenAPI.

use crate::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /capabilities - Query system capabilities
#[utoipa::path(
    get,
    path = "/capabilities",
    tag = "system",
    responses(
        (status = 200, description = "Current system capabilities", body = crate::types::Capabilities)
    )
)]
pub async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    let capabilities = state.downloader.capabilities();
    (StatusCode::OK, Json(capabilities))
}

/// GET /proxy-status - Proxy health and rate limiter counters
#[utoipa::path(
    get,
    path = "/proxy-status",
    tag = "system",
    responses(
        (status = 200, description = "Proxy health (null without a proxy) and rate limit statistics", body = crate::types::ProxyStatus)
    )
)]
pub async fn proxy_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.downloader.proxy_status().await))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}
