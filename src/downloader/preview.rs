//! Metadata preview through the strategy chain.

use std::net::IpAddr;

use crate::error::Result;
use crate::retry::try_strategies;
use crate::types::PreviewInfo;

use super::MediaDownloader;

impl MediaDownloader {
    /// Fetch display metadata for a URL without starting a job
    ///
    /// Tries every configured strategy in order within the shared budget.
    /// Not rate limited.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`](crate::Error::Validation) for unaccepted URLs
    /// - [`Error::NotFound`](crate::Error::NotFound) if the media is unavailable or private
    /// - [`Error::UpstreamUnavailable`](crate::Error::UpstreamUnavailable) when every strategy failed
    pub async fn preview(&self, url: &str, client_ip: Option<IpAddr>) -> Result<PreviewInfo> {
        let url = self.url_policy.check(url)?;
        let source = &self.collaborators.source;

        let (metadata, profile) = try_strategies(
            &self.collaborators.rotator,
            client_ip,
            self.config.bypass.strategy_budget,
            |profile| {
                let source = source.clone();
                let url = url.clone();
                async move { source.fetch_metadata(&url, None, &profile).await }
            },
        )
        .await?;

        tracing::info!(
            url = %url,
            strategy = ?profile.strategy,
            title = %metadata.title,
            "preview fetched"
        );
        Ok(PreviewInfo::from(metadata))
    }
}
