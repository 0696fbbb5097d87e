//! The connection manager: the accept loop, bootstrap dialing, and
//! discovery-driven dialing in response to `addr` messages.
use std::sync::Arc;

use peersync_common::PeerEndpoint;
use tokio::net::TcpListener;

use crate::session;
use crate::Shared;

/// Bind the listener and run the accept loop until shutdown.
///
/// Each accepted connection is handed to its own task running
/// [`session::accept`]; the accept loop itself never blocks on a single
/// peer's handshake.
pub async fn run_accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    let mut shutdown_rx = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                log::info!(target: "p2p::connmgr", "accept loop stopping");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        log::debug!(target: "p2p::connmgr", "accepted connection from {addr}");
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            session::accept(shared, stream, addr.ip().to_string()).await;
                        });
                    }
                    Err(e) => {
                        log::warn!(target: "p2p::connmgr", "accept failed: {e}");
                    }
                }
            }
        }
    }
}

/// Dial every bootstrap endpoint sequentially, staggered by
/// `config.bootstrap_stagger`.
pub async fn dial_bootstrap(shared: Arc<Shared>) {
    let bootstrap = shared.config.bootstrap.clone();
    for endpoint in bootstrap {
        if shared.addrbook.lock().await.connected_count() >= shared.config.target_peers {
            break;
        }
        spawn_dial(shared.clone(), endpoint);
        tokio::time::sleep(shared.config.bootstrap_stagger).await;
    }
}

/// React to a received `addr` message: if we are below the target peer
/// count, dial up to `discovery_dials_per_addr` random undialed endpoints,
/// staggered by `config.discovery_stagger`.
pub fn maybe_dial_discovered(shared: Arc<Shared>, discovered: Vec<PeerEndpoint>) {
    tokio::spawn(async move {
        {
            let mut addrbook = shared.addrbook.lock().await;
            addrbook.learn_many(discovered);
        }
        let connected = shared.addrbook.lock().await.connected_count();
        if connected >= shared.config.target_peers {
            return;
        }
        let rng = fastrand::Rng::new();
        let candidates = {
            let addrbook = shared.addrbook.lock().await;
            addrbook.sample_undialed(shared.config.discovery_dials_per_addr, &rng)
        };
        for endpoint in candidates {
            if shared.addrbook.lock().await.connected_count() >= shared.config.target_peers {
                break;
            }
            spawn_dial(shared.clone(), endpoint);
            tokio::time::sleep(shared.config.discovery_stagger).await;
        }
    });
}

/// Force-dial an endpoint regardless of the target peer count, honoring
/// `manual_connect`.
pub async fn manual_connect(shared: Arc<Shared>, endpoint: PeerEndpoint) -> bool {
    match session::dial(shared, endpoint.clone()).await {
        Ok(()) => true,
        Err(e) => {
            log::info!(target: "p2p::connmgr", "manual_connect to {endpoint} failed: {e}");
            false
        }
    }
}

fn spawn_dial(shared: Arc<Shared>, endpoint: PeerEndpoint) {
    tokio::spawn(async move {
        if let Err(e) = session::dial(shared, endpoint.clone()).await {
            log::info!(target: "p2p::connmgr", "dial to {endpoint} failed: {e}");
        }
    });
}
