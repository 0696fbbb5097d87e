//! Peer endpoints: the `host:port` addresses the address book and
//! connection manager traffic in.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A `host:port` pair addressing a peer's listener.
///
/// Equality and hashing are structural on `(host, port)`; the canonical
/// textual form used on the wire and in logs is `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerEndpoint {
    /// Hostname or IP address, as given.
    pub host: String,
    /// TCP port, in `1..=65535`.
    pub port: u16,
}

/// An error parsing a [`PeerEndpoint`] from its `host:port` textual form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseEndpointError {
    /// The string did not contain a `:` separating host and port.
    #[error("missing ':' separator in endpoint {0:?}")]
    MissingSeparator(String),
    /// The port segment was not a valid `u16`.
    #[error("invalid port in endpoint {0:?}")]
    InvalidPort(String),
}

impl PeerEndpoint {
    /// Construct an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether this endpoint names the loopback host by the conventions
    /// this protocol recognizes (`127.0.0.1` or `localhost`), used by the
    /// self-connect guard.
    pub fn is_loopback_host(&self) -> bool {
        self.host == "127.0.0.1" || self.host == "localhost"
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerEndpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseEndpointError::MissingSeparator(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ParseEndpointError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let e = PeerEndpoint::new("127.0.0.1", 5000);
        let s = e.to_string();
        assert_eq!(s, "127.0.0.1:5000");
        assert_eq!(s.parse::<PeerEndpoint>().unwrap(), e);
    }

    #[test]
    fn rejects_missing_port() {
        assert!("127.0.0.1".parse::<PeerEndpoint>().is_err());
    }

    #[test]
    fn recognizes_loopback_host() {
        assert!(PeerEndpoint::new("localhost", 1).is_loopback_host());
        assert!(PeerEndpoint::new("127.0.0.1", 1).is_loopback_host());
        assert!(!PeerEndpoint::new("10.0.0.5", 1).is_loopback_host());
    }
}
