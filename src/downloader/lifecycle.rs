//! Startup and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;

use super::MediaDownloader;

/// How long shutdown waits for cancelled jobs to record their final state
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl MediaDownloader {
    /// Delete temp files left behind by a previous process
    ///
    /// Anything older than `artifact_ttl * orphan_sweep_multiplier` cannot
    /// belong to a live artifact. Failures are logged, never fatal.
    pub(crate) async fn sweep_orphaned_artifacts(&self) {
        let max_age = self
            .config
            .download
            .artifact_ttl
            .saturating_mul(self.config.download.orphan_sweep_multiplier);
        match self.artifacts.sweep_orphans(max_age).await {
            Ok(0) => tracing::debug!("no orphaned temp files found"),
            Ok(removed) => tracing::info!(removed, "removed orphaned temp files"),
            Err(e) => tracing::warn!(error = %e, "failed to sweep temp directory"),
        }
    }

    /// Start the proxy health monitor background task, if a proxy is configured
    pub(crate) async fn start_proxy_monitor(&self) {
        let Some(monitor) = self.collaborators.proxy_monitor.clone() else {
            tracing::debug!("No proxy configured, skipping proxy health monitor");
            return;
        };
        let handle = monitor.spawn(self.services.shutdown.child_token());
        self.services.handles.lock().await.push(handle);
        tracing::info!("Proxy health monitor background task started");
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new jobs
    /// 2. Cancels all running jobs (each records `error / "Download cancelled"`)
    /// 3. Waits for their tasks to finish, with a timeout (30 seconds)
    /// 4. Stops background services
    ///
    /// Temp artifacts are left on disk; the next start sweeps them.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new jobs
        self.job_state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        // 2. Cancel running jobs
        self.cancel_all_jobs().await;

        // 3. Wait for job tasks with timeout
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs stopped"),
            Err(_) => tracing::warn!("Timeout waiting for jobs to stop, proceeding with shutdown"),
        }

        // 4. Stop background services
        self.services.shutdown.cancel();
        let handles: Vec<_> = self.services.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new jobs are still accepted
    pub fn is_accepting_jobs(&self) -> bool {
        self.job_state.accepting_new.load(Ordering::SeqCst)
    }

    async fn cancel_all_jobs(&self) {
        let active = self.job_state.active_jobs.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling all running jobs");
        for (id, token) in active.iter() {
            tracing::debug!(job_id = %id, "Signaling cancellation");
            token.cancel();
        }
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.job_state.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for running jobs to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
