//! Client address resolution for identity rotation
//!
//! Proxies in front of the service report the caller in forwarding headers.
//! The first parseable header wins; the TCP peer is the fallback.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Headers consulted in order
const FORWARDING_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "x-vercel-forwarded-for",
];

/// Extractor yielding the requesting client's address, if known
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(resolve_client_ip(&parts.headers, peer)))
    }
}

/// Pick the client address from forwarding headers, else the peer
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    FORWARDING_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .find_map(|value| value.split(',').next()?.trim().parse().ok())
        .or(peer)
}
