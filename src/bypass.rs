//! Request identity rotation
//!
//! Every outbound request to the media source is described by a
//! [`RequestProfile`]: the headers to send, an optional proxy and an optional
//! local address to bind. The [`BypassRotator`] builds profiles for each
//! configured [`PreviewStrategy`]; the strategy runner in [`crate::retry`]
//! tries them in order.

use rand::seq::SliceRandom;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::{BypassConfig, ClientIpMode, PreviewStrategy};
use crate::proxy_health::ProxyHealthMonitor;

const DESKTOP_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ALTERNATE_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Safari/605.1.15";

/// How one request presents itself to the media source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestProfile {
    /// Strategy that produced this profile
    pub strategy: PreviewStrategy,
    /// Header name/value pairs, including `User-Agent`
    pub headers: Vec<(String, String)>,
    /// Proxy URL; never set together with `local_address`
    pub proxy: Option<String>,
    /// Local address to bind the outbound socket to
    pub local_address: Option<IpAddr>,
}

impl RequestProfile {
    fn new(strategy: PreviewStrategy, user_agent: &str) -> Self {
        Self {
            strategy,
            headers: vec![("User-Agent".to_string(), user_agent.to_string())],
            proxy: None,
            local_address: None,
        }
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn desktop_headers(self) -> Self {
        self.header("Accept", DESKTOP_ACCEPT)
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("Accept-Encoding", "gzip, deflate")
            .header("DNT", "1")
            .header("Connection", "keep-alive")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Cache-Control", "max-age=0")
    }

    fn forwarded_for(self, ip: IpAddr, include_cf: bool) -> Self {
        let ip = ip.to_string();
        let profile = self
            .header("X-Forwarded-For", &ip)
            .header("X-Real-IP", &ip);
        if include_cf {
            profile.header("CF-Connecting-IP", &ip)
        } else {
            profile
        }
    }

    /// Value of a header, case-insensitive
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `User-Agent` header
    pub fn user_agent(&self) -> Option<&str> {
        self.header_value("User-Agent")
    }
}

/// Client addresses worth presenting upstream
fn routable(client_ip: Option<IpAddr>) -> Option<IpAddr> {
    client_ip.filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
}

/// Builds request profiles from the user-agent pool, proxy health and client IP
pub struct BypassRotator {
    config: BypassConfig,
    proxy: Option<Arc<ProxyHealthMonitor>>,
}

impl BypassRotator {
    /// Create a rotator; `proxy` is consulted for every rotated profile
    pub fn new(config: BypassConfig, proxy: Option<Arc<ProxyHealthMonitor>>) -> Self {
        Self { config, proxy }
    }

    /// Configured strategy order
    pub fn strategies(&self) -> &[PreviewStrategy] {
        &self.config.strategies
    }

    fn random_user_agent(&self) -> &str {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(ALTERNATE_USER_AGENT)
    }

    async fn healthy_proxy(&self) -> Option<String> {
        match &self.proxy {
            Some(monitor) if monitor.is_healthy().await => Some(monitor.proxy_url().to_string()),
            _ => None,
        }
    }

    /// Fresh identity for the next request
    ///
    /// Random user agent and desktop header set. A healthy proxy wins; without
    /// one, a routable client IP is forwarded in headers and, in bind mode,
    /// also used as the local address.
    pub async fn next_request_profile(&self, client_ip: Option<IpAddr>) -> RequestProfile {
        let mut profile =
            RequestProfile::new(PreviewStrategy::Rotated, self.random_user_agent()).desktop_headers();

        if let Some(proxy) = self.healthy_proxy().await {
            profile.proxy = Some(proxy);
            return profile;
        }

        if let Some(ip) = routable(client_ip) {
            profile = profile.forwarded_for(ip, true);
            if self.config.client_ip_mode == ClientIpMode::Bind {
                profile.local_address = Some(ip);
            }
        }
        profile
    }

    /// Profile for one strategy, or `None` when it cannot apply to this client
    pub async fn strategy_profile(
        &self,
        strategy: PreviewStrategy,
        client_ip: Option<IpAddr>,
    ) -> Option<RequestProfile> {
        match strategy {
            PreviewStrategy::Rotated => Some(self.next_request_profile(client_ip).await),
            PreviewStrategy::ClientIpBound => {
                let ip = routable(client_ip)?;
                let mut profile = RequestProfile::new(strategy, self.random_user_agent())
                    .forwarded_for(ip, false);
                profile.local_address = Some(ip);
                Some(profile)
            }
            PreviewStrategy::ClientIpHeaders => {
                let ip = routable(client_ip)?;
                Some(RequestProfile::new(strategy, self.random_user_agent()).forwarded_for(ip, true))
            }
            PreviewStrategy::AlternateHeaders => {
                let profile = RequestProfile::new(strategy, ALTERNATE_USER_AGENT)
                    .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                    .header("Accept-Language", "en-US,en;q=0.5")
                    .header("Accept-Encoding", "gzip, deflate")
                    .header("DNT", "1")
                    .header("Connection", "keep-alive")
                    .header("Upgrade-Insecure-Requests", "1");
                Some(match routable(client_ip) {
                    Some(ip) => profile.forwarded_for(ip, false),
                    None => profile,
                })
            }
            PreviewStrategy::Bare => Some(RequestProfile::new(strategy, self.random_user_agent())),
        }
    }
}
