//! Job admission: validation, rate limiting and progress seeding.

use std::net::IpAddr;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::rate_limiter::Admission;
use crate::types::{ArtifactHandle, JobId, OutputFormat};

use super::MediaDownloader;
use super::pipeline::{JobSpec, JobTarget};

/// A request to fetch one media URL
#[derive(Clone, Debug)]
pub struct JobRequest {
    /// Page URL on the media host
    pub url: String,
    /// Requested output format
    pub format: OutputFormat,
    /// Address of the requesting client, used for identity rotation
    pub client_ip: Option<IpAddr>,
}

impl JobRequest {
    /// Request without client address information
    pub fn new(url: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            url: url.into(),
            format,
            client_ip: None,
        }
    }

    /// Attach the requesting client's address
    pub fn with_client_ip(mut self, client_ip: Option<IpAddr>) -> Self {
        self.client_ip = client_ip;
        self
    }
}

impl MediaDownloader {
    /// Start a job that writes its result into the download directory
    ///
    /// When this returns, `get_progress` for the returned id already reports
    /// `downloading / 0`. The fetch itself runs in a background task.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the URL does not match an accepted source shape
    /// - [`Error::RateLimited`] if the submission window is full
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started
    pub async fn submit(&self, request: JobRequest) -> Result<JobId> {
        let (job_id, _) = self.start_job(request, false).await?;
        Ok(job_id)
    }

    /// Start a job whose result is held in the temp artifact store
    ///
    /// The artifact handle equals the job id, so a client that knows one
    /// knows the other. Redeem it with [`serve_artifact`](Self::serve_artifact)
    /// or [`redeem_artifact`](Self::redeem_artifact) before the TTL runs out.
    pub async fn create_artifact(&self, request: JobRequest) -> Result<(JobId, ArtifactHandle)> {
        let (job_id, handle) = self.start_job(request, true).await?;
        let handle = handle.ok_or_else(|| Error::Other("artifact handle was not allocated".into()))?;
        Ok((job_id, handle))
    }

    async fn start_job(
        &self,
        request: JobRequest,
        temporary: bool,
    ) -> Result<(JobId, Option<ArtifactHandle>)> {
        if !self.job_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        // malformed input never consumes quota
        let url = self.url_policy.check(&request.url)?;
        self.admit().await?;

        let job_id = JobId::generate();
        let handle = temporary.then(|| ArtifactHandle::from(&job_id));

        // seed before anything can observe the id
        self.progress.seed(job_id.clone(), handle.clone());

        let cancel = tokio_util::sync::CancellationToken::new();
        self.job_state
            .active_jobs
            .lock()
            .await
            .insert(job_id.clone(), cancel.clone());

        tracing::info!(
            job_id = %job_id,
            url = %url,
            format = ?request.format,
            temporary,
            "job submitted"
        );

        self.spawn_job(
            JobSpec {
                id: job_id.clone(),
                url,
                format: request.format,
                client_ip: request.client_ip,
                target: match &handle {
                    Some(handle) => JobTarget::Temporary(handle.clone()),
                    None => JobTarget::Permanent,
                },
            },
            cancel,
        );

        Ok((job_id, handle))
    }

    /// Run the rate-limit gate, if enabled
    async fn admit(&self) -> Result<()> {
        if !self.config.server.api.rate_limit.enabled {
            return Ok(());
        }
        match self.rate_limiter.try_admit().await {
            Admission::Allowed => Ok(()),
            Admission::Denied { retry_after } => {
                // always positive
                let retry_after_ms = (retry_after.as_millis() as u64).max(1);
                tracing::warn!(retry_after_ms, "submission rate limited");
                Err(Error::RateLimited { retry_after_ms })
            }
        }
    }
}
