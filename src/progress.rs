//! Job progress store
//!
//! Holds the latest [`ProgressSnapshot`] per job and fans every change out on
//! a broadcast channel for streaming clients. Updates are merges: fields an
//! update does not name keep their current value.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::types::{ArtifactHandle, JobId, JobStatus, ProgressSnapshot};

/// Buffer for the snapshot broadcast channel
const SNAPSHOT_CHANNEL_CAPACITY: usize = 1024;

/// Partial update merged into a snapshot
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressUpdate {
    /// New status
    pub status: Option<JobStatus>,
    /// New percentage (clamped to 100)
    pub progress: Option<u8>,
    /// Display filename
    pub filename: Option<String>,
    /// Failure message
    pub error: Option<String>,
}

impl ProgressUpdate {
    /// Progress-only update
    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            ..Default::default()
        }
    }

    /// Status change with a percentage
    pub fn status(status: JobStatus, percent: u8) -> Self {
        Self {
            status: Some(status),
            progress: Some(percent),
            ..Default::default()
        }
    }

    /// Terminal success
    pub fn completed(filename: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            filename: Some(filename.into()),
            error: None,
        }
    }

    /// Terminal failure; progress resets to 0
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            progress: Some(0),
            filename: None,
            error: Some(message.into()),
        }
    }
}

/// Concurrency-safe map of job snapshots
#[derive(Clone)]
pub struct ProgressStore {
    entries: Arc<DashMap<JobId, ProgressSnapshot>>,
    tx: broadcast::Sender<ProgressSnapshot>,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(DashMap::new()),
            tx,
        }
    }

    /// Insert the initial `downloading / 0` snapshot
    ///
    /// Must happen before the job id is returned to the caller.
    pub fn seed(&self, job_id: JobId, artifact_handle: Option<ArtifactHandle>) -> ProgressSnapshot {
        let snapshot = ProgressSnapshot::seeded(job_id.clone(), artifact_handle);
        self.entries.insert(job_id, snapshot.clone());
        let _ = self.tx.send(snapshot.clone());
        snapshot
    }

    /// Snapshot for `job_id`, or a synthetic `error / "not found"` snapshot
    pub fn get(&self, job_id: &JobId) -> ProgressSnapshot {
        self.lookup(job_id)
            .unwrap_or_else(|| ProgressSnapshot::not_found(job_id.clone()))
    }

    /// Snapshot for `job_id` if the store knows it
    pub fn lookup(&self, job_id: &JobId) -> Option<ProgressSnapshot> {
        self.entries.get(job_id).map(|entry| entry.value().clone())
    }

    /// Merge `update` into the job's snapshot
    ///
    /// The read-modify-write happens under the entry's shard lock, so
    /// concurrent updates to one job never lose fields. Updates to terminal
    /// snapshots and backwards transitions are rejected.
    pub fn apply(&self, job_id: &JobId, update: ProgressUpdate) -> Result<ProgressSnapshot> {
        let snapshot = {
            let mut entry = self
                .entries
                .get_mut(job_id)
                .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
            let current = entry.value_mut();

            let next_status = update.status.unwrap_or(current.status);
            if current.status.is_terminal() || !current.status.can_transition_to(next_status) {
                tracing::warn!(
                    job_id = %job_id,
                    from = %current.status,
                    to = %next_status,
                    "rejected progress update"
                );
                return Err(Error::TransitionRejected {
                    job_id: job_id.to_string(),
                    from: current.status.to_string(),
                    to: next_status.to_string(),
                });
            }

            current.status = next_status;
            if let Some(progress) = update.progress {
                current.progress = progress.min(100);
            }
            if let Some(filename) = update.filename {
                current.filename = Some(filename);
            }
            if let Some(error) = update.error {
                current.error = Some(error);
            }
            current.clone()
        };

        // no receivers is fine
        let _ = self.tx.send(snapshot.clone());
        Ok(snapshot)
    }

    /// Receive every snapshot written from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// Number of tracked jobs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no jobs are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobId {
        JobId::from(id)
    }

    #[test]
    fn unknown_job_reads_as_not_found_error() {
        let store = ProgressStore::new();
        let snap = store.get(&job("missing"));
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(snap.error.as_deref(), Some("not found"));
        assert!(store.lookup(&job("missing")).is_none());
    }

    #[test]
    fn seeded_job_is_immediately_visible() {
        let store = ProgressStore::new();
        store.seed(job("1"), None);
        let snap = store.get(&job("1"));
        assert_eq!(snap.status, JobStatus::Downloading);
        assert_eq!(snap.progress, 0);
    }

    #[test]
    fn updates_merge_and_keep_unnamed_fields() {
        let store = ProgressStore::new();
        let handle = ArtifactHandle::parse("1").unwrap();
        store.seed(job("1"), Some(handle.clone()));

        store.apply(&job("1"), ProgressUpdate::progress(40)).unwrap();
        let snap = store
            .apply(&job("1"), ProgressUpdate::status(JobStatus::Converting, 50))
            .unwrap();

        assert_eq!(snap.status, JobStatus::Converting);
        assert_eq!(snap.progress, 50);
        assert_eq!(snap.artifact_handle, Some(handle));
    }

    #[test]
    fn terminal_snapshots_reject_updates() {
        let store = ProgressStore::new();
        store.seed(job("1"), None);
        store
            .apply(&job("1"), ProgressUpdate::completed("song.mp3"))
            .unwrap();

        let err = store
            .apply(&job("1"), ProgressUpdate::failed("late failure"))
            .unwrap_err();
        assert!(matches!(err, Error::TransitionRejected { .. }));

        let snap = store.get(&job("1"));
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.filename.as_deref(), Some("song.mp3"));
        assert!(snap.error.is_none());
    }

    #[test]
    fn converting_cannot_go_back_to_downloading() {
        let store = ProgressStore::new();
        store.seed(job("1"), None);
        store
            .apply(&job("1"), ProgressUpdate::status(JobStatus::Converting, 50))
            .unwrap();
        assert!(
            store
                .apply(&job("1"), ProgressUpdate::status(JobStatus::Downloading, 10))
                .is_err()
        );
    }

    #[test]
    fn failure_resets_progress() {
        let store = ProgressStore::new();
        store.seed(job("1"), None);
        store.apply(&job("1"), ProgressUpdate::progress(70)).unwrap();
        let snap = store
            .apply(&job("1"), ProgressUpdate::failed("boom"))
            .unwrap();
        assert_eq!(snap.progress, 0);
        assert_eq!(snap.status, JobStatus::Error);
    }

    #[test]
    fn update_for_unknown_job_is_not_found() {
        let store = ProgressStore::new();
        assert!(matches!(
            store.apply(&job("nope"), ProgressUpdate::progress(1)),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn subscribers_see_every_write() {
        let store = ProgressStore::new();
        let mut rx = store.subscribe();
        store.seed(job("1"), None);
        store.apply(&job("1"), ProgressUpdate::progress(10)).unwrap();

        assert_eq!(rx.recv().await.unwrap().progress, 0);
        assert_eq!(rx.recv().await.unwrap().progress, 10);
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_fields() {
        let store = ProgressStore::new();
        store.seed(job("1"), ArtifactHandle::parse("h1").ok());

        let mut handles = Vec::new();
        for p in 1..=50u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.apply(&JobId::from("1"), ProgressUpdate::progress(p))
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let snap = store.get(&job("1"));
        assert_eq!(snap.artifact_handle.unwrap().as_str(), "h1");
        assert_eq!(snap.status, JobStatus::Downloading);
    }
}
