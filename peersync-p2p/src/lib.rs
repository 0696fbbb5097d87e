//! Peer session management, address-book discovery, and the blockchain
//! sync engine.
//!
//! [`NodeP2p`] is the crate's entry point: it owns the listener, the
//! shared chain store and address book, and every background task
//! (accept loop, keep-alive, per-session read/write tasks).
#![warn(missing_docs)]

pub mod addrmgr;
pub mod config;
pub mod connmgr;
pub mod error;
pub mod message;
pub mod pingmgr;
pub mod session;
pub mod syncmgr;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use peersync_common::{ChainStore, NodeIdentity, PeerEndpoint};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};

pub use addrmgr::AddressBook;
pub use config::Config;
pub use error::Error;
pub use session::SessionHandle;
pub use syncmgr::{SyncMode, SyncState};

/// State shared by every task the node spawns. Always accessed through an
/// `Arc<Shared>`; nothing here is cloned, only the handle to it.
pub struct Shared {
    /// This node's short, opaque identity.
    pub node_id: NodeIdentity,
    /// Listener and timing configuration.
    pub config: Config,
    /// Known and connected peer endpoints.
    pub addrbook: Mutex<AddressBook>,
    /// The header/block/mempool/best-chain index.
    pub chain: Mutex<ChainStore>,
    /// Live sessions, keyed by their registered endpoint.
    pub sessions: Mutex<HashMap<PeerEndpoint, SessionHandle>>,
    /// Sync engine bookkeeping.
    pub sync: Mutex<SyncState>,
    /// Whether the node is currently running; flips to `false` on `stop`.
    pub running: AtomicBool,
    /// Broadcasts a one-shot shutdown signal to every background task.
    pub shutdown: watch::Sender<bool>,
}

/// A point-in-time copy of the node's status, safe to retain after the
/// call returns.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// This node's identity.
    pub node_id: String,
    /// The configured listen port.
    pub port: u16,
    /// Whether the node is currently running.
    pub running: bool,
    /// The number of currently connected peers.
    pub connected_peers: usize,
    /// The number of known peer endpoints.
    pub known_peers: usize,
    /// The current sync phase.
    pub sync_mode: SyncMode,
    /// The peers we currently have an active sync session with.
    pub syncing_with: Vec<PeerEndpoint>,
    /// The current best-chain height.
    pub chain_height: u64,
    /// The current best-chain tip hash.
    pub chain_tip: String,
    /// The number of admitted headers.
    pub header_count: usize,
    /// The number of downloaded blocks.
    pub block_count: usize,
    /// The number of mempool transactions.
    pub mempool_count: usize,
    /// The number of best-chain blocks not yet downloaded.
    pub missing_block_count: usize,
}

/// The P2P node: owns the listener and every background task, and exposes
/// the control surface (`start`/`stop`/`manual_connect`/`status`).
pub struct NodeP2p {
    shared: Arc<Shared>,
    accept_task: Option<tokio::task::JoinHandle<()>>,
    pingmgr_task: Option<tokio::task::JoinHandle<()>>,
}

impl NodeP2p {
    /// Construct a node with a freshly generated identity and an empty
    /// chain store seeded only with genesis.
    pub fn new(config: Config, genesis_timestamp: u64) -> Self {
        let rng = fastrand::Rng::new();
        let node_id = NodeIdentity::generate(&rng);
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            node_id,
            config,
            addrbook: Mutex::new(AddressBook::new()),
            chain: Mutex::new(ChainStore::new(genesis_timestamp)),
            sessions: Mutex::new(HashMap::new()),
            sync: Mutex::new(SyncState::new()),
            running: AtomicBool::new(false),
            shutdown,
        });
        Self {
            shared,
            accept_task: None,
            pingmgr_task: None,
        }
    }

    /// Seed the chain store with a synthetic chain and mempool before
    /// starting, for tests or demo fixtures (see
    /// [`peersync_common::ChainStore::seed`]).
    pub async fn seed_chain(
        &self,
        blocks: Vec<peersync_common::Block>,
        mempool: Vec<peersync_common::Transaction>,
    ) {
        self.shared.chain.lock().await.seed(blocks, mempool);
    }

    /// Bind the listener, spawn the accept loop and keep-alive service,
    /// and dial the bootstrap endpoints. Returns once the listener is
    /// bound; background tasks continue running.
    pub async fn start(&mut self) -> Result<(), Error> {
        let listener = TcpListener::bind(("0.0.0.0", self.shared.config.port))
            .await
            .map_err(|source| Error::Bind {
                port: self.shared.config.port,
                source,
            })?;

        self.shared.running.store(true, Ordering::SeqCst);
        log::info!(target: "node", "listening on 0.0.0.0:{}", self.shared.config.port);

        self.accept_task = Some(tokio::spawn(connmgr::run_accept_loop(
            self.shared.clone(),
            listener,
        )));
        self.pingmgr_task = Some(tokio::spawn(pingmgr::run(self.shared.clone())));

        tokio::spawn(connmgr::dial_bootstrap(self.shared.clone()));

        Ok(())
    }

    /// Signal every background task to stop and force-close all sessions.
    /// Returns once the shutdown signal has been broadcast; in-flight
    /// sessions close on their next loop iteration.
    pub async fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let _ = self.shared.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.pingmgr_task.take() {
            let _ = task.await;
        }
        log::info!(target: "node", "stopped");
    }

    /// Force-dial an endpoint regardless of the current connected count.
    pub async fn manual_connect(&self, host: impl Into<String>, port: u16) -> bool {
        let endpoint = PeerEndpoint::new(host, port);
        connmgr::manual_connect(self.shared.clone(), endpoint).await
    }

    /// A point-in-time snapshot of this node's status.
    pub async fn status(&self) -> StatusSnapshot {
        let addrbook = self.shared.addrbook.lock().await;
        let chain = self.shared.chain.lock().await;
        let sync = self.shared.sync.lock().await;
        StatusSnapshot {
            node_id: self.shared.node_id.as_str().to_string(),
            port: self.shared.config.port,
            running: self.shared.running.load(Ordering::SeqCst),
            connected_peers: addrbook.connected_count(),
            known_peers: addrbook.known_count(),
            sync_mode: sync.mode,
            syncing_with: sync.syncing_with.iter().cloned().collect(),
            chain_height: chain.chain_height(),
            chain_tip: chain.chain_tip().to_string(),
            header_count: chain.header_count(),
            block_count: chain.block_count(),
            mempool_count: chain.mempool_len(),
            missing_block_count: chain.missing_blocks().len(),
        }
    }

    /// This node's generated identity.
    pub fn node_id(&self) -> &str {
        self.shared.node_id.as_str()
    }

    /// Direct access to the shared state, for embedders and tests that
    /// need to drive sessions without going through the control API
    /// (e.g. asserting on address-book membership directly).
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}
