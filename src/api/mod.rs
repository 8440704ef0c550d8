//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for submitting media jobs,
//! following their progress and collecting the results.

use crate::{Config, MediaDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod client_ip;
pub mod error_response;
pub mod json_body;
pub mod openapi;
pub mod routes;
pub mod state;

pub use client_ip::ClientIp;
pub use json_body::JsonBody;
pub use openapi::ApiDoc;
pub use state::AppState;

/// Path of the OpenAPI document served alongside the Swagger UI
pub const SWAGGER_DOC_PATH: &str = "/api-docs/openapi.json";

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /submit` - Start a download into the download directory
/// - `GET /progress?jobId=` - Current progress snapshot
/// - `GET /progress/stream?jobId=` - Server-sent progress events
/// - `POST /cancel` - Cancel a running job
/// - `POST /preview` - Media metadata without downloading
///
/// ## Temp Artifacts
/// - `POST /artifacts` - Start a job whose result is held temporarily
/// - `GET /artifacts?handle=` - Stream the artifact as an attachment
/// - `PUT /artifacts` - Move the artifact into the download directory
///
/// ## System
/// - `GET /proxy-status` - Proxy health and rate limit counters
/// - `GET /capabilities` - Query system capabilities
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled),
///   reading its document from [`SWAGGER_DOC_PATH`]
pub fn create_router(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Jobs
        .route("/submit", post(routes::submit_job))
        .route("/progress", get(routes::get_progress))
        .route("/progress/stream", get(routes::progress_stream))
        .route("/cancel", post(routes::cancel_job))
        .route("/preview", post(routes::preview_media))
        // Temp artifacts
        .route(
            "/artifacts",
            post(routes::create_artifact)
                .get(routes::serve_artifact)
                .put(routes::redeem_artifact),
        )
        // System
        .route("/proxy-status", get(routes::proxy_status))
        .route("/capabilities", get(routes::get_capabilities))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes if enabled in config (before applying state).
    // SwaggerUi registers its own document route, which must not collide
    // with /openapi.json above.
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url(SWAGGER_DOC_PATH, ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails; see [`start_api_server_with_shutdown`] for a
/// server that stops on a signal.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(MediaDownloader::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// media_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Result<()> {
    start_api_server_with_shutdown(downloader, config, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `signal` resolves
///
/// In-flight requests are allowed to finish. The downloader itself is not
/// shut down here.
pub async fn start_api_server_with_shutdown<F>(
    downloader: Arc<MediaDownloader>,
    config: Arc<Config>,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(crate::error::Error::Io)?,
        "API server listening"
    );

    // ConnectInfo<SocketAddr> feeds the client IP fallback
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
