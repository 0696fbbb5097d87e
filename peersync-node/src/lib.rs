//! The embeddable peer-to-peer sync node.
//!
//! [`Node`] is a thin control-API wrapper around [`peersync_p2p::NodeP2p`]:
//! it owns nothing on its own beyond what the P2P layer already manages,
//! and exists only to give an embedding application a single `start` /
//! `stop` / `manual_connect` / `status` surface.
#![warn(missing_docs)]

pub mod error;

use std::time::{SystemTime, UNIX_EPOCH};

pub use error::Error;
pub use peersync_p2p::{Config, StatusSnapshot, SyncMode};
use peersync_common::{Block, Transaction};

/// An embeddable peer-to-peer blockchain sync node.
pub struct Node {
    inner: peersync_p2p::NodeP2p,
}

impl Node {
    /// Construct a node from `config`, with a genesis header timestamped
    /// at construction time.
    pub fn new(config: Config) -> Self {
        let genesis_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            inner: peersync_p2p::NodeP2p::new(config, genesis_timestamp),
        }
    }

    /// Seed the chain store with a synthetic chain and mempool before
    /// starting. Intended for tests and demo fixtures exercising the sync
    /// pipeline without a second, pre-populated peer.
    pub async fn seed_chain(&self, blocks: Vec<Block>, mempool: Vec<Transaction>) {
        self.inner.seed_chain(blocks, mempool).await;
    }

    /// Bind the listener and start every background task.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.inner.start().await.map_err(Error::from)
    }

    /// Stop every background task and close all sessions.
    pub async fn stop(&mut self) {
        self.inner.stop().await;
    }

    /// Force-dial an endpoint regardless of the current connected count.
    /// Returns whether the handshake succeeded.
    pub async fn manual_connect(&self, host: impl Into<String>, port: u16) -> bool {
        self.inner.manual_connect(host, port).await
    }

    /// A point-in-time snapshot of this node's status.
    pub async fn status(&self) -> StatusSnapshot {
        self.inner.status().await
    }

    /// This node's generated identity.
    pub fn node_id(&self) -> &str {
        self.inner.node_id()
    }
}
