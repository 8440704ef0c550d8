//! Job handlers: submission, progress, cancellation and preview.

use super::{
    CancelRequest, CancelResponse, PreviewRequest, PreviewResponse, ProgressQuery, SubmitRequest,
    SubmitResponse,
};
use crate::api::AppState;
use crate::api::client_ip::ClientIp;
use crate::api::json_body::JsonBody;
use crate::downloader::JobRequest;
use crate::error::{ApiError, Error};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use std::convert::Infallible;

/// POST /submit - Start a download into the download directory
#[utoipa::path(
    post,
    path = "/submit",
    tag = "jobs",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Job started", body = SubmitResponse),
        (status = 400, description = "Invalid URL or format", body = ApiError),
        (status = 429, description = "Submission window is full", body = ApiError),
        (status = 503, description = "Server is shutting down", body = ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    JsonBody(request): JsonBody<SubmitRequest>,
) -> Response {
    let format = match request.output_format() {
        Ok(format) => format,
        Err(e) => return e.into_response(),
    };
    let job = JobRequest::new(request.url, format).with_client_ip(client_ip);
    match state.downloader.submit(job).await {
        Ok(job_id) => (StatusCode::OK, Json(SubmitResponse { job_id })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /progress - Current snapshot of a job
///
/// Always 200 for a present `jobId`; unknown ids report `error / "not found"`.
#[utoipa::path(
    get,
    path = "/progress",
    tag = "jobs",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Progress snapshot", body = crate::types::ProgressSnapshot),
        (status = 400, description = "jobId missing", body = ApiError)
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Response {
    match query.require_job_id() {
        Ok(job_id) => (StatusCode::OK, Json(state.downloader.get_progress(&job_id))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /progress/stream - Server-sent progress events for one job
///
/// Emits the current snapshot first, then every change; the stream closes
/// after the terminal snapshot.
#[utoipa::path(
    get,
    path = "/progress/stream",
    tag = "jobs",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 400, description = "jobId missing", body = ApiError)
    )
)]
pub async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Response {
    let job_id = match query.require_job_id() {
        Ok(job_id) => job_id,
        Err(e) => return e.into_response(),
    };

    let events = state
        .downloader
        .progress_stream(job_id)
        .filter_map(|snapshot| async move {
            match serde_json::to_string(&snapshot) {
                Ok(json_data) => Some(Ok::<_, Infallible>(
                    SseEvent::default()
                        .event(snapshot.status.as_str())
                        .data(json_data),
                )),
                Err(e) => {
                    tracing::warn!("Failed to serialize snapshot to JSON: {}", e);
                    None
                }
            }
        });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// POST /cancel - Cancel a running job
#[utoipa::path(
    post,
    path = "/cancel",
    tag = "jobs",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Whether a running job was signalled", body = CancelResponse)
    )
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CancelRequest>,
) -> impl IntoResponse {
    let cancelled = state.downloader.cancel_job(&request.job_id).await;
    (StatusCode::OK, Json(CancelResponse { cancelled }))
}

/// POST /preview - Fetch display metadata without downloading
#[utoipa::path(
    post,
    path = "/preview",
    tag = "jobs",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Media metadata", body = PreviewResponse),
        (status = 400, description = "Invalid URL", body = ApiError),
        (status = 404, description = "Video is unavailable or private", body = ApiError),
        (status = 502, description = "Media source unreachable", body = ApiError)
    )
)]
pub async fn preview_media(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    JsonBody(request): JsonBody<PreviewRequest>,
) -> Response {
    match state.downloader.preview(&request.url, client_ip).await {
        Ok(preview) => (
            StatusCode::OK,
            Json(PreviewResponse {
                success: true,
                preview,
            }),
        )
            .into_response(),
        Err(Error::NotFound(reason)) => {
            tracing::debug!(url = %request.url, reason = %reason, "preview target unavailable");
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new("not_found", "Video is unavailable or private")),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}
