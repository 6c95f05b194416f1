//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: login and registration (~10/min per client)
//! - `api_rate_limiter`: everything else under `/api` (~100/min per client)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers checked for the client address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 2] = ["x-real-ip", "x-forwarded-for"];

/// Keys requests by client IP.
///
/// Proxy headers win over the socket peer so a reverse proxy does not put
/// every client in one bucket.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        for name in CLIENT_IP_HEADERS {
            // First hop of a forwarded chain.
            if let Some(ip) = headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
            {
                return Ok(ip);
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

fn limiter(replenish_every_secs: u64, burst: u32) -> Option<RateLimiterLayer> {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(replenish_every_secs)
        .burst_size(burst)
        .finish()?;
    Some(GovernorLayer::new(Arc::new(config)))
}

/// Auth endpoints: one request every 6 seconds, burst of 5.
///
/// # Panics
///
/// Never in practice: `GovernorConfigBuilder` only rejects zero periods or
/// bursts.
#[must_use]
#[allow(clippy::expect_used)]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    limiter(6, 5).expect("non-zero auth rate limit")
}

/// General API: one request per second, burst of 100.
///
/// # Panics
///
/// Never in practice: `GovernorConfigBuilder` only rejects zero periods or
/// bursts.
#[must_use]
#[allow(clippy::expect_used)]
pub fn api_rate_limiter() -> RateLimiterLayer {
    limiter(1, 100).expect("non-zero API rate limit")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/api/products");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_forwarded_chain_uses_first_hop() {
        let req = request(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(
            ClientIpKeyExtractor.extract(&req).unwrap(),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_real_ip_wins() {
        let req = request(&[("x-forwarded-for", "203.0.113.7"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(
            ClientIpKeyExtractor.extract(&req).unwrap(),
            "198.51.100.2".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_falls_back_to_peer() {
        let mut req = request(&[]);
        assert!(ClientIpKeyExtractor.extract(&req).is_err());

        let peer: SocketAddr = "192.0.2.10:51000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(ClientIpKeyExtractor.extract(&req).unwrap(), peer.ip());
    }

    #[test]
    fn test_limiters_build() {
        let _ = auth_rate_limiter();
        let _ = api_rate_limiter();
    }
}
