//! The sync engine: the four-phase pipeline (`headers → blocks → mempool →
//! live`) that drives chain convergence, plus the message handlers that
//! answer the corresponding requests from other peers.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use peersync_common::{Block, BlockHeader, PeerEndpoint, Transaction};

use crate::message::{Message, MAX_HEADERS_PER_BATCH, MAX_INV_PER_BATCH};
use crate::Shared;

/// Which sync phase the node is in.
///
/// Mirrors the reference's single node-level `sync_mode`: every peer we
/// sync with drives the same state machine rather than each carrying an
/// independent phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Requesting and applying headers.
    Headers,
    /// Requesting block inventory and full block bodies.
    Blocks,
    /// Requesting mempool contents.
    Mempool,
    /// Steady state: answering requests, initiating none.
    Live,
}

/// Node-level sync bookkeeping.
#[derive(Debug)]
pub struct SyncState {
    /// The current phase.
    pub mode: SyncMode,
    /// Peers we have an active sync session with.
    pub syncing_with: HashSet<PeerEndpoint>,
    /// Hashes with an outstanding `getdata` request, deduplicated globally.
    pub requested_blocks: HashSet<String>,
    /// Per-peer in-flight `getdata` counts, for the concurrency cap.
    inflight_by_peer: HashMap<PeerEndpoint, usize>,
}

impl SyncState {
    /// A fresh state machine, starting in the headers phase with no
    /// syncing peers.
    pub fn new() -> Self {
        Self {
            mode: SyncMode::Headers,
            syncing_with: HashSet::new(),
            requested_blocks: HashSet::new(),
            inflight_by_peer: HashMap::new(),
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

async fn send_to(shared: &Shared, endpoint: &PeerEndpoint, msg: Message) {
    let sender = {
        let sessions = shared.sessions.lock().await;
        sessions.get(endpoint).map(|h| h.sender.clone())
    };
    if let Some(sender) = sender {
        if sender.send(msg).await.is_err() {
            log::debug!(target: "p2p::syncmgr", "send to {endpoint} failed: queue closed");
        }
    }
}

/// Called once a session reaches `Connected`. Schedules `start_headers_sync`
/// after the configured entry delay, unless the node has already converged
/// to live mode.
pub fn on_session_established(shared: Arc<Shared>, endpoint: PeerEndpoint) {
    tokio::spawn(async move {
        tokio::time::sleep(shared.config.sync_entry_delay).await;
        let mode = shared.sync.lock().await.mode;
        if mode != SyncMode::Live {
            start_headers_sync(&shared, &endpoint).await;
        }
    });
}

/// Phase 1 entry: request headers after our current tip.
pub async fn start_headers_sync(shared: &Shared, endpoint: &PeerEndpoint) {
    {
        let mut sync = shared.sync.lock().await;
        sync.mode = SyncMode::Headers;
        sync.syncing_with.insert(endpoint.clone());
    }
    let tip = shared.chain.lock().await.chain_tip().to_string();
    log::debug!(target: "p2p::syncmgr", "starting headers sync with {endpoint} from {tip}");
    send_to(
        shared,
        endpoint,
        Message::Getheaders {
            from_block: tip,
            node_id: shared.node_id.as_str().to_string(),
        },
    )
    .await;
}

/// Answer a `getheaders` request.
pub async fn handle_getheaders(shared: &Arc<Shared>, from: &PeerEndpoint, from_block: &str) {
    let headers = {
        let chain = shared.chain.lock().await;
        chain.headers_after(from_block, MAX_HEADERS_PER_BATCH)
    };
    let count = headers.len();
    send_to(shared, from, Message::Headers { headers, count }).await;
}

/// Apply a `headers` response: admit every header, continue pulling more
/// headers if the batch was full and advanced the tip, otherwise move the
/// peer into the block-inventory phase.
pub async fn handle_headers(shared: &Arc<Shared>, from: &PeerEndpoint, headers: Vec<BlockHeader>) {
    let batch_len = headers.len();
    let mut newly_admitted: Vec<BlockHeader> = Vec::new();
    {
        let mut chain = shared.chain.lock().await;
        for header in headers {
            if chain.has_header(&header.hash) {
                continue;
            }
            if chain.add_header(header.clone()).is_ok() {
                newly_admitted.push(header);
            }
        }
    }

    if newly_admitted.is_empty() {
        start_blocks_sync(shared, from).await;
        return;
    }

    if batch_len >= MAX_HEADERS_PER_BATCH {
        let last_hash = newly_admitted.last().unwrap().hash.clone();
        send_to(
            shared,
            from,
            Message::Getheaders {
                from_block: last_hash,
                node_id: shared.node_id.as_str().to_string(),
            },
        )
        .await;
    } else {
        start_blocks_sync(shared, from).await;
    }
}

/// Phase 2 entry: request block inventory, or skip straight to mempool
/// sync if nothing is missing.
pub async fn start_blocks_sync(shared: &Shared, endpoint: &PeerEndpoint) {
    shared.sync.lock().await.mode = SyncMode::Blocks;

    let missing = shared.chain.lock().await.missing_blocks();
    if missing.is_empty() {
        start_mempool_sync(shared, endpoint).await;
        return;
    }

    let from_height = {
        let chain = shared.chain.lock().await;
        chain.header(&missing[0]).map(|h| h.height).unwrap_or(0)
    };
    send_to(
        shared,
        endpoint,
        Message::Getblocks {
            from_height,
            node_id: shared.node_id.as_str().to_string(),
        },
    )
    .await;
}

/// Answer a `getblocks` request with the downloaded blocks in range.
pub async fn handle_getblocks(shared: &Arc<Shared>, from: &PeerEndpoint, from_height: u64) {
    let blocks = {
        let chain = shared.chain.lock().await;
        chain.inventory_from_height(from_height, MAX_INV_PER_BATCH)
    };
    let count = blocks.len();
    send_to(shared, from, Message::Inv { blocks, count }).await;
}

/// Phase 3: request full block data for every newly-announced hash, up to
/// the per-peer in-flight cap.
pub async fn handle_inv(shared: &Arc<Shared>, from: &PeerEndpoint, blocks: Vec<String>) {
    let mut to_request = Vec::new();
    {
        let chain = shared.chain.lock().await;
        let mut sync = shared.sync.lock().await;
        let inflight = sync.inflight_by_peer.entry(from.clone()).or_insert(0);
        for hash in blocks {
            if *inflight >= shared.config.max_inflight_getdata {
                break;
            }
            if chain.has_block(&hash) || sync.requested_blocks.contains(&hash) {
                continue;
            }
            sync.requested_blocks.insert(hash.clone());
            *inflight += 1;
            to_request.push(hash);
        }
    }
    for hash in to_request {
        send_to(
            shared,
            from,
            Message::Getdata {
                block: hash,
                node_id: shared.node_id.as_str().to_string(),
            },
        )
        .await;
    }
}

/// Answer a `getdata` request with the requested block, if we have it.
pub async fn handle_getdata(shared: &Arc<Shared>, from: &PeerEndpoint, hash: &str) {
    let block = shared.chain.lock().await.block(hash).cloned();
    if let Some(block) = block {
        send_to(shared, from, Message::Block { block }).await;
    } else {
        log::debug!(target: "p2p::syncmgr", "{from} requested unknown block {hash}");
    }
}

/// Admit a delivered block, then either request more or advance to phase 4.
pub async fn handle_block(shared: &Arc<Shared>, from: &PeerEndpoint, block: Block) {
    let hash = block.hash().to_string();
    let admitted = {
        let mut chain = shared.chain.lock().await;
        chain.add_block(block).is_ok()
    };
    let missing_count = {
        let mut sync = shared.sync.lock().await;
        sync.requested_blocks.remove(&hash);
        if let Some(inflight) = sync.inflight_by_peer.get_mut(from) {
            *inflight = inflight.saturating_sub(1);
        }
        drop(sync);
        shared.chain.lock().await.missing_blocks().len()
    };

    if !admitted {
        log::debug!(target: "p2p::syncmgr", "rejected block {hash} from {from}");
    }

    if missing_count == 0 {
        start_mempool_sync(shared, from).await;
    }
}

/// Phase 4 entry: request the peer's mempool.
pub async fn start_mempool_sync(shared: &Shared, endpoint: &PeerEndpoint) {
    shared.sync.lock().await.mode = SyncMode::Mempool;
    send_to(
        shared,
        endpoint,
        Message::Mempool {
            node_id: shared.node_id.as_str().to_string(),
        },
    )
    .await;
}

/// Answer a `mempool` request with our mempool contents.
pub async fn handle_mempool_request(shared: &Arc<Shared>, from: &PeerEndpoint) {
    let transactions: Vec<Transaction> = {
        let chain = shared.chain.lock().await;
        chain.mempool_values().cloned().collect()
    };
    let count = transactions.len();
    send_to(shared, from, Message::Tx { transactions, count }).await;
}

/// Ingest a delivered mempool batch and converge to live mode.
pub async fn handle_tx_batch(shared: &Arc<Shared>, from: &PeerEndpoint, transactions: Vec<Transaction>) {
    {
        let mut chain = shared.chain.lock().await;
        for tx in transactions {
            let _ = chain.add_tx(tx);
        }
    }
    let mut sync = shared.sync.lock().await;
    sync.mode = SyncMode::Live;
    sync.syncing_with.remove(from);
    log::info!(target: "p2p::syncmgr", "sync with {from} converged to live mode");
}
