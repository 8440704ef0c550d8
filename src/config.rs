//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Download behavior configuration (directories, artifact lifetime, time budgets)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Permanent download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Temporary directory for working files and temp artifacts (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// How long an unredeemed temp artifact lives (default: 60 seconds)
    #[serde(default = "default_artifact_ttl", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub artifact_ttl: Duration,

    /// Files in the temp directory older than `artifact_ttl * multiplier` are
    /// deleted at startup (default: 5)
    #[serde(default = "default_orphan_sweep_multiplier")]
    pub orphan_sweep_multiplier: u32,

    /// Upper bound on a whole job, fetch plus conversion (default: 30 minutes, None = unbounded)
    #[serde(
        default = "default_fetch_timeout",
        with = "optional_duration_serde"
    )]
    #[schema(value_type = Option<u64>)]
    pub fetch_timeout: Option<Duration>,

    /// Regular expressions a submitted URL must match (case-insensitive, any of)
    #[serde(default = "default_accepted_url_patterns")]
    pub accepted_url_patterns: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            artifact_ttl: default_artifact_ttl(),
            orphan_sweep_multiplier: default_orphan_sweep_multiplier(),
            fetch_timeout: default_fetch_timeout(),
            accepted_url_patterns: default_accepted_url_patterns(),
        }
    }
}

/// External tool paths (yt-dlp, ffmpeg) and codec settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Audio bitrate for MP3 conversion in kbit/s (default: 320)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            search_path: true,
            audio_bitrate_kbps: default_audio_bitrate(),
        }
    }
}

/// How a client IP is applied to outbound requests when no proxy is in use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClientIpMode {
    /// Only forward the address in `X-Forwarded-For` style headers (default)
    #[default]
    Forward,
    /// Bind the outbound socket to the client address.
    /// Only works when that address is local to this host.
    Bind,
}

/// One way of presenting a request to the media source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStrategy {
    /// Rotated user agent plus the rotator's proxy / client-IP decision
    Rotated,
    /// Bind to the client IP (skipped for loopback or unknown client)
    ClientIpBound,
    /// Forward the client IP in headers (skipped for loopback or unknown client)
    ClientIpHeaders,
    /// Alternate browser header set (Safari-like)
    AlternateHeaders,
    /// No identity headers at all
    Bare,
}

/// Request fingerprint rotation settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BypassConfig {
    /// User-agent pool to rotate through
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Client IP handling when no healthy proxy is available
    #[serde(default)]
    pub client_ip_mode: ClientIpMode,

    /// Ordered strategies tried for metadata lookups; the winning one is
    /// reused for the byte stream
    #[serde(default = "default_preview_strategies")]
    pub strategies: Vec<PreviewStrategy>,

    /// Shared time budget across all strategies (default: 45 seconds)
    #[serde(default = "default_strategy_budget", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub strategy_budget: Duration,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            client_ip_mode: ClientIpMode::default(),
            strategies: default_preview_strategies(),
            strategy_budget: default_strategy_budget(),
        }
    }
}

/// Outbound proxy and its health probing
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProxyConfig {
    /// Proxy URL (http://, https:// or socks5://)
    pub url: String,

    /// Optional username for proxy authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for proxy authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Health probe settings
    #[serde(default)]
    pub health: ProxyHealthConfig,
}

impl ProxyConfig {
    /// Proxy URL with credentials embedded, as the external tools expect it
    pub fn url_with_credentials(&self) -> Result<String> {
        let mut url = url::Url::parse(&self.url).map_err(|e| Error::Config {
            message: format!("invalid proxy url: {e}"),
            key: Some("proxy.url".into()),
        })?;
        if let Some(user) = &self.username {
            let bad_url = |_| Error::Config {
                message: "proxy url cannot carry credentials".into(),
                key: Some("proxy.url".into()),
            };
            url.set_username(user).map_err(bad_url)?;
            url.set_password(self.password.as_deref()).map_err(bad_url)?;
        }
        Ok(url.to_string())
    }
}

/// Proxy health probe configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProxyHealthConfig {
    /// Time between probes (default: 30 seconds)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub check_interval: Duration,

    /// URL fetched through the proxy; a JSON `origin` field is reported as the exit IP
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Timeout for one probe (default: 10 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub probe_timeout: Duration,

    /// Error count at which the proxy is considered unhealthy (default: 5)
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
}

impl Default for ProxyHealthConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            probe_url: default_probe_url(),
            probe_timeout: default_probe_timeout(),
            max_errors: default_max_errors(),
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
///
/// Download and tool settings are flattened so the JSON format stays shallow;
/// bypass and proxy settings live under their own keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings (directories, TTL, time budgets)
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External tool paths and codec settings
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Request fingerprint rotation
    #[serde(default)]
    pub bypass: BypassConfig,

    /// Optional outbound proxy
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    /// API server integration
    #[serde(flatten)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.bypass.user_agents.is_empty() {
            return Err(Error::Config {
                message: "at least one user agent is required".into(),
                key: Some("bypass.user_agents".into()),
            });
        }
        if self.bypass.strategies.is_empty() {
            return Err(Error::Config {
                message: "at least one strategy is required".into(),
                key: Some("bypass.strategies".into()),
            });
        }
        if self.download.accepted_url_patterns.is_empty() {
            return Err(Error::Config {
                message: "at least one accepted url pattern is required".into(),
                key: Some("accepted_url_patterns".into()),
            });
        }
        if self.download.artifact_ttl.is_zero() {
            return Err(Error::Config {
                message: "artifact_ttl must be greater than zero".into(),
                key: Some("artifact_ttl".into()),
            });
        }
        let limit = &self.server.api.rate_limit;
        if limit.enabled && (limit.max_requests == 0 || limit.window.is_zero()) {
            return Err(Error::Config {
                message: "rate limit needs a positive max_requests and window".into(),
                key: Some("rate_limit".into()),
            });
        }
        if let Some(proxy) = &self.proxy {
            proxy.url_with_credentials()?;
            if proxy.health.max_errors == 0 {
                return Err(Error::Config {
                    message: "max_errors must be at least 1".into(),
                    key: Some("proxy.health.max_errors".into()),
                });
            }
        }
        Ok(())
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Submission rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Sliding-window limit on job-initiating requests (process-wide)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per window (default: 30)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds (default: 60000)
    #[serde(default = "default_rate_window", with = "duration_millis_serde")]
    #[schema(value_type = u64)]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window: default_rate_window(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_artifact_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_orphan_sweep_multiplier() -> u32 {
    5
}

fn default_fetch_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30 * 60))
}

fn default_accepted_url_patterns() -> Vec<String> {
    vec![r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/)".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_audio_bitrate() -> u32 {
    320
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_preview_strategies() -> Vec<PreviewStrategy> {
    vec![
        PreviewStrategy::Rotated,
        PreviewStrategy::ClientIpBound,
        PreviewStrategy::ClientIpHeaders,
        PreviewStrategy::AlternateHeaders,
        PreviewStrategy::Bare,
    ]
}

fn default_strategy_budget() -> Duration {
    Duration::from_secs(45)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_url() -> String {
    "https://httpbin.org/ip".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_errors() -> u32 {
    5
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_requests() -> u32 {
    30
}

fn default_rate_window() -> Duration {
    Duration::from_millis(60_000)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond variant for the rate-limit window
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
