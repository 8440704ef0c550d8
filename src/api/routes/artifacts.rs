//! Temp artifact handlers.

use super::{
    ArtifactQuery, CreateArtifactResponse, RedeemRequest, RedeemResponse, SubmitRequest,
};
use crate::api::AppState;
use crate::api::client_ip::ClientIp;
use crate::api::json_body::JsonBody;
use crate::downloader::JobRequest;
use crate::error::ApiError;
use crate::utils::content_disposition;
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

/// POST /artifacts - Start a job whose result is kept as a temp artifact
#[utoipa::path(
    post,
    path = "/artifacts",
    tag = "artifacts",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Job started", body = CreateArtifactResponse),
        (status = 400, description = "Invalid URL or format", body = ApiError),
        (status = 429, description = "Submission window is full", body = ApiError),
        (status = 503, description = "Server is shutting down", body = ApiError)
    )
)]
pub async fn create_artifact(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    JsonBody(request): JsonBody<SubmitRequest>,
) -> Response {
    let format = match request.output_format() {
        Ok(format) => format,
        Err(e) => return e.into_response(),
    };
    let job = JobRequest::new(request.url, format).with_client_ip(client_ip);
    match state.downloader.create_artifact(job).await {
        Ok((job_id, artifact_handle)) => (
            StatusCode::OK,
            Json(CreateArtifactResponse {
                job_id,
                artifact_handle,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /artifacts - Stream a completed artifact as an attachment
///
/// Serving does not consume the artifact; it expires with its TTL or when
/// redeemed.
#[utoipa::path(
    get,
    path = "/artifacts",
    tag = "artifacts",
    params(ArtifactQuery),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown, malformed or expired handle", body = ApiError)
    )
)]
pub async fn serve_artifact(
    State(state): State<AppState>,
    Query(query): Query<ArtifactQuery>,
) -> Response {
    let (record, file) = match state.downloader.serve_artifact(&query.handle).await {
        Ok(opened) => opened,
        Err(e) => return e.into_response(),
    };

    let length = file.metadata().await.ok().map(|m| m.len());
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime_for(&record.display_name)),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    match HeaderValue::from_str(&content_disposition(&record.display_name)) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(e) => {
            tracing::warn!(handle = %record.handle, error = %e, "unusable content disposition");
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment"),
            );
        }
    }
    response
}

/// PUT /artifacts - Move an artifact into the download directory
#[utoipa::path(
    put,
    path = "/artifacts",
    tag = "artifacts",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Artifact redeemed", body = RedeemResponse),
        (status = 400, description = "Body is not a valid redeem request", body = ApiError),
        (status = 404, description = "Unknown, malformed, expired or already redeemed handle", body = ApiError),
        (status = 500, description = "Copy into the download directory failed", body = ApiError)
    )
)]
pub async fn redeem_artifact(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RedeemRequest>,
) -> Response {
    match state.downloader.redeem_artifact(&request.handle).await {
        Ok(final_filename) => {
            (StatusCode::OK, Json(RedeemResponse { final_filename })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// MIME type by the artifact's extension
fn mime_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for("Song.mp3"), "audio/mpeg");
        assert_eq!(mime_for("Clip.MP4"), "video/mp4");
        assert_eq!(mime_for("no_extension"), "application/octet-stream");
    }
}
