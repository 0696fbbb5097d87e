//! End-to-end handshake and discovery scenarios over real loopback TCP,
//! driven through [`peersync_p2p::NodeP2p`] directly so the tests can
//! inspect the shared address book without going through the status
//! surface.
use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

use peersync_common::PeerEndpoint;
use peersync_p2p::{Config, NodeP2p};

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn node(port: u16) -> NodeP2p {
    let config = Config::new(port).with_bootstrap(vec![]);
    NodeP2p::new(config, 0)
}

/// Two nodes handshake and land in live mode immediately, since neither
/// has any headers the other lacks.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_node_handshake() {
    let port_a = free_port();
    let port_b = free_port();

    let mut a = node(port_a);
    let mut b = node(port_b);
    a.start().await.unwrap();
    b.start().await.unwrap();

    assert!(b.manual_connect("127.0.0.1", port_a).await);

    let mut converged = false;
    for _ in 0..50 {
        let sa = a.status().await;
        let sb = b.status().await;
        if sa.connected_peers == 1 && sb.connected_peers == 1 && sb.sync_mode == peersync_p2p::SyncMode::Live
        {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(converged, "nodes did not converge within the timeout");

    let status_a = a.status().await;
    let status_b = b.status().await;
    assert!(status_a.known_peers >= status_a.connected_peers);
    assert_eq!(status_b.connected_peers, 1);

    a.stop().await;
    b.stop().await;
}

/// A node dialing its own listener must never end up in its own
/// `connected` set.
#[tokio::test(flavor = "multi_thread")]
async fn self_connect_is_rejected() {
    let port = free_port();
    let mut a = node(port);
    a.start().await.unwrap();

    let ok = a.manual_connect("127.0.0.1", port).await;
    assert!(!ok);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(a.status().await.connected_peers, 0);

    a.stop().await;
}

/// `addr` gossip propagates third-party endpoints: once B and C have both
/// dialed A, each should learn the other's reported endpoint.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn address_gossip_through_common_peer() {
    let port_a = free_port();
    let port_b = free_port();
    let port_c = free_port();

    let mut a = node(port_a);
    let mut b = node(port_b);
    let mut c = node(port_c);
    a.start().await.unwrap();
    b.start().await.unwrap();
    c.start().await.unwrap();

    assert!(b.manual_connect("127.0.0.1", port_a).await);
    assert!(c.manual_connect("127.0.0.1", port_a).await);

    let target_b = PeerEndpoint::new("127.0.0.1", port_c);
    let target_c = PeerEndpoint::new("127.0.0.1", port_b);

    let mut gossiped = false;
    for _ in 0..80 {
        let known_b = b.shared().addrbook.lock().await.known_snapshot();
        let known_c = c.shared().addrbook.lock().await.known_snapshot();
        if known_b.contains(&target_b) && known_c.contains(&target_c) {
            gossiped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(gossiped, "addr gossip did not propagate within the timeout");

    a.stop().await;
    b.stop().await;
    c.stop().await;
}
