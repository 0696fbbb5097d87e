//! Node configuration: the listen port, bootstrap endpoints, connection
//! targets, and the timing constants of the concurrency model.
use std::time::Duration;

use peersync_common::PeerEndpoint;

/// The default hardcoded bootstrap endpoints (reference values).
pub fn default_bootstrap() -> Vec<PeerEndpoint> {
    vec![
        PeerEndpoint::new("127.0.0.1", 5001),
        PeerEndpoint::new("127.0.0.1", 5002),
        PeerEndpoint::new("127.0.0.1", 5003),
    ]
}

/// Connection counts, timeouts, and cadences governing the peer session
/// and sync subsystems.
///
/// Constructed with [`Config::new`]; every other field can be overridden
/// with its builder method before the node starts.
#[derive(Debug, Clone)]
pub struct Config {
    /// The local TCP listen port.
    pub port: u16,
    /// Endpoints dialed sequentially at startup.
    pub bootstrap: Vec<PeerEndpoint>,
    /// The target number of simultaneously connected peers.
    pub target_peers: usize,
    /// The accept-loop listen backlog.
    pub listen_backlog: u32,
    /// The stagger between successive bootstrap dials.
    pub bootstrap_stagger: Duration,
    /// The stagger between successive discovery-driven dials.
    pub discovery_stagger: Duration,
    /// The maximum number of discovery dials triggered per `addr` message.
    pub discovery_dials_per_addr: usize,
    /// The dial connect timeout.
    pub dial_timeout: Duration,
    /// The inbound handshake read timeout.
    pub handshake_timeout: Duration,
    /// The established-session read idle timeout, after which a `ping` is
    /// sent.
    pub read_idle_timeout: Duration,
    /// The keep-alive tick cadence.
    pub keepalive_interval: Duration,
    /// The delay before a newly established session is handed to the sync
    /// engine, avoiding a race with the handshake's first reads.
    pub sync_entry_delay: Duration,
    /// The maximum number of in-flight `getdata` requests per peer.
    pub max_inflight_getdata: usize,
    /// The outbound send queue depth per session.
    pub send_queue_capacity: usize,
}

impl Config {
    /// Construct a configuration for a node listening on `port`, with every
    /// other field set to its reference default.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bootstrap: default_bootstrap(),
            target_peers: 8,
            listen_backlog: 10,
            bootstrap_stagger: Duration::from_millis(500),
            discovery_stagger: Duration::from_secs(1),
            discovery_dials_per_addr: 2,
            dial_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
            read_idle_timeout: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(30),
            sync_entry_delay: Duration::from_secs(1),
            max_inflight_getdata: 10,
            send_queue_capacity: 64,
        }
    }

    /// Override the bootstrap endpoint list.
    pub fn with_bootstrap(mut self, bootstrap: Vec<PeerEndpoint>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Override the target connected-peer count.
    pub fn with_target_peers(mut self, target_peers: usize) -> Self {
        self.target_peers = target_peers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = Config::new(5000);
        assert_eq!(cfg.target_peers, 8);
        assert_eq!(cfg.bootstrap.len(), 3);
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(30));
        assert_eq!(cfg.read_idle_timeout, Duration::from_secs(60));
        assert_eq!(cfg.max_inflight_getdata, 10);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = Config::new(5000).with_target_peers(2);
        assert_eq!(cfg.target_peers, 2);
    }
}
