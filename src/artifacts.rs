//! Temp artifact store
//!
//! Finished files produced for the artifact flow live in the temp directory
//! under `<handle>_<displayName>` until they are redeemed, discarded, or their
//! expiry timer fires. Each record carries its own async lock so redemption
//! and expiry are serialized: whichever takes the lock first wins and the
//! other sees the record gone.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{ArtifactHandle, TempArtifact};
use crate::utils::reserve_unique_path;

struct Entry {
    record: TempArtifact,
    generation: u64,
    expiry: CancellationToken,
    guard: Arc<Mutex<()>>,
}

struct Inner {
    dir: PathBuf,
    ttl: Duration,
    entries: Mutex<HashMap<ArtifactHandle, Entry>>,
    next_generation: AtomicU64,
}

/// Short-lived files awaiting redemption
#[derive(Clone)]
pub struct TempArtifactStore {
    inner: Arc<Inner>,
}

impl TempArtifactStore {
    /// Create a store rooted at `dir` with the given time-to-live
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                ttl,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Directory holding artifacts and working files
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    fn path_for(&self, handle: &ArtifactHandle, display_name: &str) -> PathBuf {
        self.inner
            .dir
            .join(format!("{}_{}", handle.as_str(), display_name))
    }

    /// Register a record and start its expiry timer
    ///
    /// The caller is expected to write the file at the returned path.
    pub async fn create(
        &self,
        display_name: &str,
        handle: Option<ArtifactHandle>,
    ) -> Result<TempArtifact> {
        let handle = handle.unwrap_or_else(ArtifactHandle::generate);
        let path = self.path_for(&handle, display_name);
        self.register(handle, path, display_name).await
    }

    /// Move a finished working file into the store
    pub async fn adopt(
        &self,
        display_name: &str,
        handle: Option<ArtifactHandle>,
        working_file: &Path,
    ) -> Result<TempArtifact> {
        let handle = handle.unwrap_or_else(ArtifactHandle::generate);
        if self.inner.entries.lock().await.contains_key(&handle) {
            return Err(Error::Validation(format!(
                "artifact handle {handle} already exists"
            )));
        }
        let path = self.path_for(&handle, display_name);
        tokio::fs::rename(working_file, &path).await?;
        match self.register(handle, path.clone(), display_name).await {
            Ok(record) => Ok(record),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn register(
        &self,
        handle: ArtifactHandle,
        path: PathBuf,
        display_name: &str,
    ) -> Result<TempArtifact> {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.inner.ttl)
            .map_err(|e| Error::Other(format!("artifact ttl out of range: {e}")))?;
        let record = TempArtifact {
            handle: handle.clone(),
            path,
            display_name: display_name.to_string(),
            created_at,
            expires_at: created_at + ttl,
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let expiry = CancellationToken::new();
        {
            let mut entries = self.inner.entries.lock().await;
            if entries.contains_key(&handle) {
                return Err(Error::Validation(format!(
                    "artifact handle {handle} already exists"
                )));
            }
            entries.insert(
                handle.clone(),
                Entry {
                    record: record.clone(),
                    generation,
                    expiry: expiry.clone(),
                    guard: Arc::new(Mutex::new(())),
                },
            );
        }

        let store = self.clone();
        let ttl = self.inner.ttl;
        tokio::spawn(async move {
            tokio::select! {
                _ = expiry.cancelled() => {}
                _ = tokio::time::sleep(ttl) => store.expire(&handle, generation).await,
            }
        });

        tracing::debug!(handle = %record.handle, path = %record.path.display(), "temp artifact registered");
        Ok(record)
    }

    async fn expire(&self, handle: &ArtifactHandle, generation: u64) {
        let Some(guard) = self.guard_for(handle).await else {
            return;
        };
        let _held = guard.lock().await;

        let removed = {
            let mut entries = self.inner.entries.lock().await;
            match entries.get(handle) {
                Some(entry) if entry.generation == generation => entries.remove(handle),
                _ => None,
            }
        };
        if let Some(entry) = removed {
            remove_quietly(&entry.record.path).await;
            tracing::info!(handle = %handle, "temp artifact expired");
        }
    }

    async fn guard_for(&self, handle: &ArtifactHandle) -> Option<Arc<Mutex<()>>> {
        self.inner
            .entries
            .lock()
            .await
            .get(handle)
            .map(|entry| entry.guard.clone())
    }

    /// Record for `handle`, if it is still live
    pub async fn get(&self, handle: &ArtifactHandle) -> Option<TempArtifact> {
        self.inner
            .entries
            .lock()
            .await
            .get(handle)
            .map(|entry| entry.record.clone())
    }

    /// Open the artifact's file for streaming without consuming it
    pub async fn open(&self, handle: &ArtifactHandle) -> Result<(TempArtifact, tokio::fs::File)> {
        let record = self
            .get(handle)
            .await
            .ok_or_else(|| Error::NotFound(format!("artifact {handle}")))?;
        match tokio::fs::File::open(&record.path).await {
            Ok(file) => Ok((record, file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("artifact {handle}")))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Copy the artifact into `destination_dir` under its display name
    ///
    /// A name collision gets a ` (n)` suffix. On success the record, timer and
    /// temp file are removed. On failure the record stays redeemable.
    pub async fn redeem_to(&self, handle: &ArtifactHandle, destination_dir: &Path) -> Result<PathBuf> {
        let guard = self
            .guard_for(handle)
            .await
            .ok_or_else(|| Error::NotFound(format!("artifact {handle}")))?;
        let _held = guard.lock().await;

        // expiry may have won while we waited for the guard
        let record = self
            .get(handle)
            .await
            .ok_or_else(|| Error::NotFound(format!("artifact {handle}")))?;

        tokio::fs::create_dir_all(destination_dir).await?;
        let destination = reserve_unique_path(&destination_dir.join(&record.display_name)).await?;
        if let Err(e) = tokio::fs::copy(&record.path, &destination).await {
            remove_quietly(&destination).await;
            tracing::warn!(handle = %handle, error = %e, "artifact redemption failed");
            return Err(if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("artifact {handle}"))
            } else {
                Error::Io(e)
            });
        }

        if let Some(entry) = self.inner.entries.lock().await.remove(handle) {
            entry.expiry.cancel();
        }
        remove_quietly(&record.path).await;

        tracing::info!(handle = %handle, destination = %destination.display(), "temp artifact redeemed");
        Ok(destination)
    }

    /// Drop the artifact immediately; returns whether it existed
    pub async fn discard(&self, handle: &ArtifactHandle) -> bool {
        let Some(guard) = self.guard_for(handle).await else {
            return false;
        };
        let _held = guard.lock().await;
        let removed = self.inner.entries.lock().await.remove(handle);
        match removed {
            Some(entry) => {
                entry.expiry.cancel();
                remove_quietly(&entry.record.path).await;
                true
            }
            None => false,
        }
    }

    /// Delete files in the temp directory older than `max_age`
    ///
    /// Run at startup to clear artifacts orphaned by a previous process.
    pub async fn sweep_orphans(&self, max_age: Duration) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.inner.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::Io(e)),
        };
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::now());
            if modified < cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "failed to remove orphaned temp file"
                    ),
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.inner.dir.display(), "swept orphaned temp files");
        }
        Ok(removed)
    }

    /// Number of live records
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    /// Whether no records are live
    pub async fn is_empty(&self) -> bool {
        self.inner.entries.lock().await.is_empty()
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}
