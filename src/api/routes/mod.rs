//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] — Submission, progress, cancellation, preview
//! - [`artifacts`] — Temp artifact creation, serving and redemption
//! - [`system`] — Health, capabilities, proxy status, OpenAPI

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ArtifactHandle, JobId, OutputFormat, PreviewInfo};

mod artifacts;
mod jobs;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use artifacts::*;
pub use jobs::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /submit and POST /artifacts
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitRequest {
    /// Media page URL
    pub url: String,
    /// "AUDIO" or "VIDEO" ("MP3" / "MP4" accepted)
    pub format: String,
}

impl SubmitRequest {
    /// Parse the format string; unknown names are validation errors
    pub(crate) fn output_format(&self) -> Result<OutputFormat> {
        self.format.parse()
    }
}

/// Response for POST /submit
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Id to poll with GET /progress
    pub job_id: JobId,
}

/// Query parameters for GET /progress and GET /progress/stream
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    /// Job id returned by a submission
    pub job_id: Option<String>,
}

impl ProgressQuery {
    pub(crate) fn require_job_id(&self) -> Result<JobId> {
        match self.job_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(JobId::from(id)),
            _ => Err(Error::Validation("jobId is required".into())),
        }
    }
}

/// Request body for POST /cancel
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Job to cancel
    pub job_id: JobId,
}

/// Response for POST /cancel
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CancelResponse {
    /// False when the job was unknown or had already finished
    pub cancelled: bool,
}

/// Request body for POST /preview
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PreviewRequest {
    /// Media page URL
    pub url: String,
}

/// Response for POST /preview
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PreviewResponse {
    /// Always true on 200
    pub success: bool,
    /// Display-ready metadata
    pub preview: PreviewInfo,
}

/// Response for POST /artifacts
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtifactResponse {
    /// Id to poll with GET /progress
    pub job_id: JobId,
    /// Handle to serve or redeem once the job completes
    pub artifact_handle: ArtifactHandle,
}

/// Query parameters for GET /artifacts
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArtifactQuery {
    /// Artifact handle
    pub handle: String,
}

/// Request body for PUT /artifacts
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct RedeemRequest {
    /// Artifact handle
    pub handle: String,
}

/// Response for PUT /artifacts
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    /// Name of the file in the download directory
    pub final_filename: String,
}
