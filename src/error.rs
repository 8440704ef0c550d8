//! Error types for media-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error variants (validation, rate limiting, upstream, codec)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - Client-facing messages that never leak upstream internals

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to clients when the media source could not be reached.
///
/// The underlying cause is logged, never returned.
pub const UPSTREAM_CLIENT_MESSAGE: &str = "Failed to fetch media from source";

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unacceptable input (bad URL, unknown format, unreadable body)
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Submission refused by the sliding-window limiter
    #[error("rate limit exceeded, retry in {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until the oldest request leaves the window
        retry_after_ms: u64,
    },

    /// Job, artifact or media item does not exist (or is no longer available)
    #[error("not found: {0}")]
    NotFound(String),

    /// Every fetch strategy against the media source failed
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Network error from an HTTP request (proxy probes)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transcoding step failed
    #[error("codec failure: {0}")]
    Codec(String),

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, capability disabled)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Operation exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Job was cancelled before it finished
    #[error("download cancelled")]
    Cancelled,

    /// Progress update attempted an illegal state transition
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    TransitionRejected {
        /// Job whose update was rejected
        job_id: String,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Text suitable for a progress snapshot's `error` field.
    ///
    /// Upstream and network causes collapse into a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Error::UpstreamUnavailable(_) | Error::Network(_) => UPSTREAM_CLIENT_MESSAGE.to_string(),
            Error::NotFound(_) => "Media is unavailable or private".to_string(),
            Error::Cancelled => "Download cancelled".to_string(),
            Error::Timeout(d) => format!("Download timed out after {}s", d.as_secs()),
            Error::Codec(_) => "Conversion failed".to_string(),
            Error::Io(_) => "Failed to write media file".to_string(),
            Error::ShuttingDown => "Server is shutting down".to_string(),
            other => other.to_string(),
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "rate_limited",
///     "message": "rate limit exceeded, retry in 4200 ms",
///     "details": { "retryAfterMs": 4200 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Validation(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict
            Error::Cancelled => 409,
            Error::TransitionRejected { .. } => 409,

            // 429 Too Many Requests
            Error::RateLimited { .. } => 429,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Codec(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 501 Not Implemented - Capability missing
            Error::NotSupported(_) => 501,

            // 502 Bad Gateway - Media source or proxy errors
            Error::UpstreamUnavailable(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            // 504 Gateway Timeout
            Error::Timeout(_) => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Config { .. } => "config_error",
            Error::RateLimited { .. } => "rate_limited",
            Error::NotFound(_) => "not_found",
            Error::UpstreamUnavailable(_) => "upstream_unavailable",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Codec(_) => "codec_failure",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::TransitionRejected { .. } => "invalid_transition",
            Error::ShuttingDown => "shutting_down",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();

        let message = match &error {
            Error::UpstreamUnavailable(_) | Error::Network(_) => {
                UPSTREAM_CLIENT_MESSAGE.to_string()
            }
            _ => error.to_string(),
        };

        let details = match &error {
            Error::RateLimited { retry_after_ms } => Some(serde_json::json!({
                "retryAfterMs": retry_after_ms,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::TransitionRejected { job_id, from, to } => Some(serde_json::json!({
                "jobId": job_id,
                "from": from,
                "to": to,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
