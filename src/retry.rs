//! Ordered fallback across request strategies
//!
//! Metadata lookups (and the byte stream that follows them) are attempted
//! with each configured [`PreviewStrategy`] in turn, all sharing one time
//! budget. The first success wins; a non-retryable error (the media itself
//! is unavailable, the input is invalid) stops the chain immediately.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::bypass::BypassRotator;
//! use media_dl::config::BypassConfig;
//! use media_dl::retry::try_strategies;
//! use std::time::Duration;
//!
//! # async fn example() -> media_dl::Result<()> {
//! let rotator = BypassRotator::new(BypassConfig::default(), None);
//! let (title, profile) = try_strategies(&rotator, None, Duration::from_secs(45), |profile| async move {
//!     // fetch something using `profile`
//!     Ok::<_, media_dl::Error>(format!("fetched as {:?}", profile.strategy))
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

use crate::bypass::{BypassRotator, RequestProfile};
use crate::error::{Error, Result};

/// Trait for errors that can be classified as worth another attempt
///
/// Failures that a different request identity might avoid (blocked,
/// throttled, connection reset) should return `true`. Failures that no
/// identity can fix (missing media, bad input, shutdown) return `false`.
pub trait IsRetryable {
    /// Returns true if the next strategy should be tried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // The source rejected or dropped this identity
            Error::UpstreamUnavailable(_) => true,
            Error::Network(_) => true,
            Error::Timeout(_) => true,
            // I/O errors can be retryable in some cases (binding to a foreign address fails here)
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::AddrNotAvailable
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Media is gone or private - same answer for every identity
            Error::NotFound(_) => false,
            Error::Validation(_) | Error::Config { .. } => false,
            Error::RateLimited { .. } => false,
            Error::ShuttingDown | Error::Cancelled => false,
            // Missing binary, unsupported operation
            Error::ExternalTool(_) | Error::NotSupported(_) => false,
            Error::Codec(_) => false,
            Error::TransitionRejected { .. } => false,
            Error::Serialization(_) | Error::ApiServerError(_) | Error::Other(_) => false,
        }
    }
}

/// Run `operation` with each applicable strategy until one succeeds
///
/// Strategies that cannot apply to this client (e.g. client-IP strategies
/// without a routable client address) are skipped. All attempts share
/// `budget`; an attempt still running when it runs out is abandoned.
///
/// Returns the value together with the profile that produced it, so later
/// requests for the same job can keep a consistent fingerprint. When every
/// strategy fails, the last cause is wrapped in
/// [`Error::UpstreamUnavailable`]; non-retryable errors are returned as-is.
pub async fn try_strategies<T, F, Fut>(
    rotator: &BypassRotator,
    client_ip: Option<IpAddr>,
    budget: Duration,
    mut operation: F,
) -> Result<(T, RequestProfile)>
where
    F: FnMut(RequestProfile) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + budget;
    let mut last_error: Option<Error> = None;
    let mut attempts = 0u32;

    for &strategy in rotator.strategies() {
        let Some(profile) = rotator.strategy_profile(strategy, client_ip).await else {
            tracing::debug!(strategy = ?strategy, "strategy not applicable, skipping");
            continue;
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            last_error = Some(Error::Timeout(budget));
            break;
        }

        attempts += 1;
        match tokio::time::timeout(remaining, operation(profile.clone())).await {
            Ok(Ok(value)) => {
                if attempts > 1 {
                    tracing::info!(strategy = ?strategy, attempts, "strategy succeeded after fallback");
                }
                return Ok((value, profile));
            }
            Ok(Err(e)) if !e.is_retryable() => {
                tracing::warn!(strategy = ?strategy, error = %e, "strategy failed with non-retryable error");
                return Err(e);
            }
            Ok(Err(e)) => {
                tracing::warn!(strategy = ?strategy, error = %e, "strategy failed, trying next");
                last_error = Some(e);
            }
            Err(_) => {
                tracing::warn!(strategy = ?strategy, budget_ms = budget.as_millis() as u64, "strategy budget exhausted");
                last_error = Some(Error::Timeout(budget));
                break;
            }
        }
    }

    let cause = match last_error {
        Some(e) => e.to_string(),
        None => "no applicable strategy".to_string(),
    };
    tracing::error!(attempts, cause = %cause, "all strategies failed");
    Err(Error::UpstreamUnavailable(cause))
}
