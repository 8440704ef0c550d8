//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the media-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// The document is served at:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.1.0",
        description = "Submit media URLs, follow job progress, and collect the resulting files",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_job,
        crate::api::routes::get_progress,
        crate::api::routes::progress_stream,
        crate::api::routes::cancel_job,
        crate::api::routes::preview_media,

        // Temp artifacts
        crate::api::routes::create_artifact,
        crate::api::routes::serve_artifact,
        crate::api::routes::redeem_artifact,

        // System
        crate::api::routes::health_check,
        crate::api::routes::get_capabilities,
        crate::api::routes::proxy_status,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::ArtifactHandle,
        crate::types::OutputFormat,
        crate::types::JobStatus,
        crate::types::ProgressSnapshot,
        crate::types::PreviewInfo,
        crate::types::ProxyHealthRecord,
        crate::types::RateLimitStats,
        crate::types::ProxyStatus,
        crate::types::Capabilities,

        // Config types from config.rs
        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::ToolsConfig,
        crate::config::BypassConfig,
        crate::config::ClientIpMode,
        crate::config::PreviewStrategy,
        crate::config::ProxyConfig,
        crate::config::ProxyHealthConfig,
        crate::config::ApiConfig,
        crate::config::RateLimitConfig,

        // API request/response types from routes
        crate::api::routes::SubmitRequest,
        crate::api::routes::SubmitResponse,
        crate::api::routes::CancelRequest,
        crate::api::routes::CancelResponse,
        crate::api::routes::PreviewRequest,
        crate::api::routes::PreviewResponse,
        crate::api::routes::CreateArtifactResponse,
        crate::api::routes::RedeemRequest,
        crate::api::routes::RedeemResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Submit media URLs, follow progress, cancel, preview metadata"),
        (name = "artifacts", description = "Temp artifacts - Short-lived results served or redeemed once"),
        (name = "system", description = "System endpoints - Health checks, capabilities, proxy status, OpenAPI spec"),
    )
)]
pub struct ApiDoc;
