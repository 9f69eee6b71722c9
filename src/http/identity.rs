//! Client identifier derivation for inbound requests.

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use std::net::SocketAddr;

use crate::ratelimit::ClientId;

/// Where the client identifier of a request comes from.
///
/// Values are taken as given; nothing is validated or normalized. A request
/// whose identifier cannot be resolved lands in the empty-string bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentitySource {
    /// The transport peer's IP address.
    #[default]
    PeerAddr,
    /// The first comma-separated value of a header set by a trusted proxy,
    /// e.g. `X-Forwarded-For`.
    Header(HeaderName),
}

impl IdentitySource {
    /// Identify the client that sent `req`.
    pub fn resolve<B>(&self, req: &Request<B>) -> ClientId {
        match self {
            IdentitySource::PeerAddr => req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| ClientId::from(*addr))
                .unwrap_or_default(),
            IdentitySource::Header(name) => req
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(|first| ClientId::from(first.trim()))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_peer_addr_uses_ip() {
        let addr: SocketAddr = "192.168.1.7:51234".parse().unwrap();
        let mut req = Request::new(Body::empty());
        req.extensions_mut().insert(ConnectInfo(addr));

        let id = IdentitySource::PeerAddr.resolve(&req);
        assert_eq!(id.as_str(), "192.168.1.7");
    }

    #[test]
    fn test_missing_peer_addr_is_empty_bucket() {
        let req = Request::new(Body::empty());
        assert!(IdentitySource::PeerAddr.resolve(&req).is_empty());
    }

    #[test]
    fn test_header_takes_first_value() {
        let req = Request::builder()
            .header("x-forwarded-for", " 203.0.113.9 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let source = IdentitySource::Header(HeaderName::from_static("x-forwarded-for"));
        assert_eq!(source.resolve(&req).as_str(), "203.0.113.9");
    }

    #[test]
    fn test_missing_header_is_empty_bucket() {
        let req = Request::new(Body::empty());
        let source = IdentitySource::Header(HeaderName::from_static("x-real-ip"));
        assert!(source.resolve(&req).is_empty());
    }
}
