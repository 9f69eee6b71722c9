//! Client identifier handling.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// An opaque key that partitions rate limit state, one bucket per value.
///
/// No normalization is applied: `::ffff:10.0.0.1` and `10.0.0.1` are
/// different clients, and the empty string is a bucket of its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the empty (unresolved) identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<IpAddr> for ClientId {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

/// Uses only the IP; the ephemeral source port is not part of the identity.
impl From<SocketAddr> for ClientId {
    fn from(addr: SocketAddr) -> Self {
        Self::from(addr.ip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_socket_addr_ignores_port() {
        let a: SocketAddr = "10.0.0.1:40000".parse().unwrap();
        let b: SocketAddr = "10.0.0.1:40001".parse().unwrap();
        assert_eq!(ClientId::from(a), ClientId::from(b));
        assert_eq!(ClientId::from(a).as_str(), "10.0.0.1");
    }

    #[test]
    fn test_ipv4_mapped_ipv6_is_distinct() {
        let v4 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mapped = IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped());
        assert_ne!(ClientId::from(v4), ClientId::from(mapped));
    }

    #[test]
    fn test_empty_identifier_is_valid() {
        let id = ClientId::from("");
        assert!(id.is_empty());
        assert_eq!(id, ClientId::default());
        assert_ne!(id, ClientId::from(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }
}
