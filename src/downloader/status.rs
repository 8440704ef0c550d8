//! Progress queries, progress streams, cancellation and service status.

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_stream::wrappers::BroadcastStream;

use crate::types::{Capabilities, JobId, ProgressSnapshot, ProxyStatus};

use super::MediaDownloader;

impl MediaDownloader {
    /// Current snapshot for a job
    ///
    /// Unknown ids yield a synthetic `error / "not found"` snapshot rather
    /// than an error, so pollers can treat every answer the same way.
    pub fn get_progress(&self, job_id: &JobId) -> ProgressSnapshot {
        self.progress.get(job_id)
    }

    /// Stream of snapshots for one job, ending after its terminal snapshot
    ///
    /// The first item is the current snapshot. Unknown ids produce the single
    /// `not found` snapshot.
    pub fn progress_stream(&self, job_id: JobId) -> BoxStream<'static, ProgressSnapshot> {
        // subscribe before reading the current snapshot
        let updates = BroadcastStream::new(self.progress.subscribe());
        let current = self.progress.get(&job_id);
        if current.status.is_terminal() {
            return futures::stream::once(futures::future::ready(current)).boxed();
        }

        let store = self.progress.clone();
        let updates = updates.filter_map(move |item| {
            let snapshot = match item {
                Ok(snapshot) if snapshot.job_id == job_id => Some(snapshot),
                Ok(_) => None,
                Err(e) => {
                    // lagged; re-read the store
                    tracing::debug!(job_id = %job_id, error = %e, "progress stream lagged");
                    Some(store.get(&job_id))
                }
            };
            futures::future::ready(snapshot)
        });

        // the receiver is dropped right after a terminal snapshot instead of
        // being polled again for an update that may never come
        let updates = futures::stream::unfold(Some(updates.boxed()), |updates| async move {
            let mut updates = updates?;
            let snapshot = updates.next().await?;
            let rest = (!snapshot.status.is_terminal()).then_some(updates);
            Some((snapshot, rest))
        });

        futures::stream::once(futures::future::ready(current))
            .chain(updates)
            .boxed()
    }

    /// Cancel a running job
    ///
    /// Returns `false` when the job is unknown or already finished. A
    /// cancelled job ends in `error` with "Download cancelled".
    pub async fn cancel_job(&self, job_id: &JobId) -> bool {
        let active = self.job_state.active_jobs.lock().await;
        match active.get(job_id) {
            Some(token) => {
                tracing::info!(job_id = %job_id, "cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of jobs whose pipeline is still running
    pub async fn active_job_count(&self) -> usize {
        self.job_state.active_jobs.lock().await.len()
    }

    /// Proxy health (if a proxy is configured) and rate limiter statistics
    pub async fn proxy_status(&self) -> ProxyStatus {
        let proxy = match &self.collaborators.proxy_monitor {
            Some(monitor) => Some(monitor.record().await),
            None => None,
        };
        ProxyStatus {
            proxy,
            rate_limit: self.rate_limiter.stats().await,
        }
    }

    /// Which collaborators are available
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            transcoding: self.collaborators.transcoder.capabilities().can_transcode,
            transcoder: self.collaborators.transcoder.name().to_string(),
            source: self.collaborators.source.name().to_string(),
        }
    }
}
