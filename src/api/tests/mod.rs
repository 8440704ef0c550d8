use super::*;
use crate::codec::NoOpTranscoder;
use crate::downloader::test_helpers::{
    FlakySource, StaticSource, VALID_URL, create_downloader_with, wait_for_terminal,
};
use crate::source::SourceAdapter;
use crate::types::{JobId, JobStatus};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;


/// Helper to create a test MediaDownloader instance wrapped in Arc
async fn create_test_downloader() -> (Arc<MediaDownloader>, tempfile::TempDir) {
    let (downloader, temp_dir) = crate::downloader::test_helpers::create_test_downloader().await;
    (Arc::new(downloader), temp_dir)
}

/// Like [`create_test_downloader`] with a custom source and config tweaks
async fn create_downloader_with_source(
    source: Arc<dyn SourceAdapter>,
    configure: impl FnOnce(&mut Config),
) -> (Arc<MediaDownloader>, tempfile::TempDir) {
    let (downloader, temp_dir) =
        create_downloader_with(source, Arc::new(NoOpTranscoder), configure).await;
    (Arc::new(downloader), temp_dir)
}

fn router_for(downloader: &Arc<MediaDownloader>) -> Router {
    create_router(downloader.clone(), downloader.config.clone())
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_stops_on_signal() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let api_handle = tokio::spawn(start_api_server_with_shutdown(
        downloader,
        config,
        async move {
            let _ = stop_rx.await;
        },
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after the signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = false;
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[test]
fn test_cors_specific_origins() {
    // Builds without panicking; unparseable origins are skipped
    let _layer = build_cors_layer(&[
        "http://localhost:3000".to_string(),
        "not a header\nvalue".to_string(),
    ]);
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let response = router_for(&downloader)
        .oneshot(get_request("/swagger-ui/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut config = (*downloader.config).clone();
    config.server.api.swagger_ui = false;
    let response = create_router(downloader, Arc::new(config))
        .oneshot(get_request("/swagger-ui/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_default_config_router_serves_both_openapi_documents() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let config = Config::default();
    assert!(config.server.api.swagger_ui);

    let app = create_router(downloader, Arc::new(config));

    let response = app
        .clone()
        .oneshot(get_request("/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request(SWAGGER_DOC_PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/submit"].is_object());
}
