//! Serving and redeeming temp artifacts.

use crate::error::{Error, Result};
use crate::types::{ArtifactHandle, TempArtifact};

use super::MediaDownloader;

impl MediaDownloader {
    /// Open an artifact for streaming to the client
    ///
    /// The record stays in place; it is removed by expiry or by a later
    /// [`redeem_artifact`](Self::redeem_artifact).
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](crate::Error::NotFound) if the handle is malformed, unknown, expired or its file is gone
    pub async fn serve_artifact(&self, handle: &str) -> Result<(TempArtifact, tokio::fs::File)> {
        let handle = known_handle(handle)?;
        let (record, file) = self.artifacts.open(&handle).await?;
        tracing::debug!(handle = %handle, name = %record.display_name, "serving temp artifact");
        Ok((record, file))
    }

    /// Copy an artifact into the download directory and retire it
    ///
    /// Returns the final file name, which carries a ` (n)` suffix when the
    /// display name was already taken. At most one call per handle succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](crate::Error::NotFound) if the handle is malformed, unknown or expired
    /// - [`Error::Io`](crate::Error::Io) if the copy fails; the artifact is kept
    pub async fn redeem_artifact(&self, handle: &str) -> Result<String> {
        let handle = known_handle(handle)?;
        let path = self
            .artifacts
            .redeem_to(&handle, &self.config.download.download_dir)
            .await?;
        let final_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(handle = %handle, final_name = %final_name, "temp artifact redeemed");
        Ok(final_name)
    }
}

/// A handle that cannot name any artifact is simply not found
fn known_handle(raw: &str) -> Result<ArtifactHandle> {
    ArtifactHandle::parse(raw).map_err(|_| Error::NotFound(format!("artifact {raw:?}")))
}
