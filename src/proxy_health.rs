//! Proxy health monitoring
//!
//! Periodically fetches a probe URL through the configured proxy and keeps a
//! [`ProxyHealthRecord`]. Errors decay by one per successful probe; the proxy
//! counts as healthy while its error count stays below `max_errors`. The
//! record starts unhealthy and the first probe runs as soon as the monitor is
//! spawned.

use chrono::Utc;
use reqwest::Proxy;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::types::ProxyHealthRecord;

#[derive(Deserialize)]
struct ProbeResponse {
    origin: Option<String>,
}

/// Build a reqwest proxy from configuration
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy> {
    let mut proxy = Proxy::all(&config.url).map_err(|e| Error::Config {
        message: format!("invalid proxy url: {e}"),
        key: Some("proxy.url".into()),
    })?;
    if let Some(username) = &config.username {
        proxy = proxy.basic_auth(username, config.password.as_deref().unwrap_or_default());
    }
    Ok(proxy)
}

/// Tracks whether the configured proxy is usable
pub struct ProxyHealthMonitor {
    config: ProxyConfig,
    proxy_url: String,
    client: reqwest::Client,
    record: RwLock<ProxyHealthRecord>,
}

impl ProxyHealthMonitor {
    /// Create a monitor; no probe runs until [`check_health`](Self::check_health)
    /// or [`spawn`](Self::spawn)
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .proxy(build_proxy_from_config(&config)?)
            .timeout(config.health.probe_timeout)
            .build()?;
        let proxy_url = config.url_with_credentials()?;
        Ok(Self {
            config,
            proxy_url,
            client,
            record: RwLock::new(ProxyHealthRecord::default()),
        })
    }

    /// Proxy URL (with credentials) handed to outbound requests
    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    /// Current record
    pub async fn record(&self) -> ProxyHealthRecord {
        self.record.read().await.clone()
    }

    /// Whether requests should currently be routed through the proxy
    pub async fn is_healthy(&self) -> bool {
        self.record.read().await.is_healthy
    }

    /// Run one probe and fold the outcome into the record
    pub async fn check_health(&self) -> ProxyHealthRecord {
        let started = Instant::now();
        match self.probe().await {
            Ok(ip) => {
                let latency = started.elapsed();
                tracing::debug!(latency_ms = latency.as_millis() as u64, ip = ?ip, "proxy probe succeeded");
                self.record_success(latency, ip).await
            }
            Err(e) => {
                tracing::warn!(error = %e, proxy = %self.config.url, "proxy probe failed");
                self.record_failure(started.elapsed()).await
            }
        }
    }

    async fn probe(&self) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.config.health.probe_url)
            .send()
            .await?
            .error_for_status()?;
        // a non-JSON body still proves the proxy works
        let body = response.text().await?;
        Ok(serde_json::from_str::<ProbeResponse>(&body)
            .ok()
            .and_then(|r| r.origin))
    }

    /// Fold a successful probe into the record
    pub async fn record_success(&self, latency: Duration, ip: Option<String>) -> ProxyHealthRecord {
        let mut record = self.record.write().await;
        record.error_count = record.error_count.saturating_sub(1);
        record.success_count += 1;
        record.response_time_ms = latency.as_millis() as u64;
        record.last_check_time = Some(Utc::now());
        record.current_ip = ip;
        record.is_healthy = record.error_count < self.config.health.max_errors;
        record.clone()
    }

    /// Fold a failed probe into the record
    pub async fn record_failure(&self, latency: Duration) -> ProxyHealthRecord {
        let mut record = self.record.write().await;
        record.error_count = record.error_count.saturating_add(1);
        record.response_time_ms = latency.as_millis() as u64;
        record.last_check_time = Some(Utc::now());
        record.current_ip = None;
        let was_healthy = record.is_healthy;
        record.is_healthy = record.error_count < self.config.health.max_errors;
        if was_healthy && !record.is_healthy {
            tracing::warn!(
                error_count = record.error_count,
                proxy = %self.config.url,
                "proxy marked unhealthy"
            );
        }
        record.clone()
    }

    /// Probe immediately, then every `check_interval` until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.health.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("proxy health monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        self.check_health().await;
                    }
                }
            }
        })
    }
}
