//! The in-memory chain store: headers, full blocks, mempool, and the
//! recomputed best chain.
use std::collections::HashMap;

use thiserror::Error;

use crate::block::{Block, BlockHeader, Height, Transaction, ZERO_HASH};

/// A rejection from one of the [`ChainStore`] admission operations.
///
/// None of these are fatal: the reference behavior is to drop the
/// offending message silently and keep serving the peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The header's parent is neither the zero hash nor already known.
    #[error("header {hash} has unknown parent {prev_hash}")]
    UnknownParent {
        /// The rejected header's hash.
        hash: String,
        /// The rejected header's declared parent.
        prev_hash: String,
    },
    /// The header's difficulty was below the allowed floor of 1.
    #[error("header {0} has invalid difficulty")]
    InvalidDifficulty(String),
    /// The block's header has not been admitted into the header index.
    #[error("block {0} has no matching header")]
    HeaderMissing(String),
    /// One of the block's transactions failed structural validation.
    #[error("block {0} contains a structurally invalid transaction")]
    InvalidTransaction(String),
    /// The transaction failed structural validation (empty field or
    /// non-positive amount).
    #[error("transaction {0} is structurally invalid")]
    InvalidStandaloneTransaction(String),
}

/// The process-wide, in-memory index of headers, blocks, mempool entries,
/// and the current best chain.
#[derive(Debug, Clone)]
pub struct ChainStore {
    headers: HashMap<String, BlockHeader>,
    blocks: HashMap<String, Block>,
    mempool: HashMap<String, Transaction>,
    best_chain: Vec<String>,
}

impl ChainStore {
    /// Construct a store containing only the genesis header, created at
    /// `timestamp`.
    pub fn new(timestamp: u64) -> Self {
        let genesis = BlockHeader::genesis(timestamp);
        let hash = genesis.hash.clone();
        let mut headers = HashMap::new();
        headers.insert(hash.clone(), genesis.clone());
        let mut blocks = HashMap::new();
        blocks.insert(
            hash.clone(),
            Block {
                header: genesis,
                transactions: Vec::new(),
            },
        );
        Self {
            headers,
            blocks,
            mempool: HashMap::new(),
            best_chain: vec![hash],
        }
    }

    /// Admit a header. Rejects headers with an unknown parent, a negative
    /// implicit height (unrepresentable here, since [`Height`] is unsigned,
    /// so this reduces to the difficulty/parent checks), or a difficulty
    /// below 1. On success, attempts a best-chain recomputation.
    ///
    /// Admitting the same header twice is a no-op that still recomputes
    /// (harmlessly: the second insert does not change the header index).
    pub fn add_header(&mut self, header: BlockHeader) -> Result<(), ChainError> {
        if header.difficulty < 1 {
            return Err(ChainError::InvalidDifficulty(header.hash));
        }
        if header.prev_hash != ZERO_HASH && !self.headers.contains_key(&header.prev_hash) {
            return Err(ChainError::UnknownParent {
                hash: header.hash,
                prev_hash: header.prev_hash,
            });
        }
        self.headers.insert(header.hash.clone(), header);
        self.recompute_best_chain();
        Ok(())
    }

    /// Admit a full block. Rejects blocks whose header hasn't been admitted,
    /// or that carry a structurally invalid transaction.
    pub fn add_block(&mut self, block: Block) -> Result<(), ChainError> {
        if !self.headers.contains_key(block.hash()) {
            return Err(ChainError::HeaderMissing(block.hash().to_string()));
        }
        if !block.has_valid_transactions() {
            return Err(ChainError::InvalidTransaction(block.hash().to_string()));
        }
        self.blocks.insert(block.hash().to_string(), block);
        Ok(())
    }

    /// Admit a standalone transaction into the mempool.
    pub fn add_tx(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if !tx.is_structurally_valid() {
            return Err(ChainError::InvalidStandaloneTransaction(tx.tx_id));
        }
        self.mempool.insert(tx.tx_id.clone(), tx);
        Ok(())
    }

    /// Recompute `best_chain` by the longest-chain-by-height rule.
    ///
    /// Scans every header whose parent is present (or is the zero hash),
    /// picks the maximum-height candidate tip (ties broken by the
    /// lexicographically smallest hash, a deterministic and arbitrary
    /// choice), and walks `prev_hash` back to genesis. If that walk is not
    /// contiguous, the previous best chain is retained unchanged.
    fn recompute_best_chain(&mut self) {
        let mut candidate_tip: Option<&BlockHeader> = None;
        for header in self.headers.values() {
            let parent_present =
                header.prev_hash == ZERO_HASH || self.headers.contains_key(&header.prev_hash);
            if !parent_present {
                continue;
            }
            candidate_tip = match candidate_tip {
                None => Some(header),
                Some(best) if header.height > best.height => Some(header),
                Some(best) if header.height == best.height && header.hash < best.hash => {
                    Some(header)
                }
                Some(best) => Some(best),
            };
        }

        let Some(tip) = candidate_tip else { return };

        let mut chain = Vec::with_capacity(tip.height as usize + 1);
        let mut cursor = tip.hash.clone();
        loop {
            let Some(header) = self.headers.get(&cursor) else {
                // Broken walk: retain the previous best chain.
                return;
            };
            chain.push(cursor.clone());
            if header.prev_hash == ZERO_HASH {
                break;
            }
            cursor = header.prev_hash.clone();
        }
        chain.reverse();
        self.best_chain = chain;
    }

    /// The current best-chain tip hash.
    pub fn chain_tip(&self) -> &str {
        self.best_chain
            .last()
            .expect("best_chain always contains at least genesis")
    }

    /// The current best-chain height (0 at genesis).
    pub fn chain_height(&self) -> Height {
        self.best_chain.len() as Height - 1
    }

    /// The current best chain, in order from genesis.
    pub fn best_chain(&self) -> &[String] {
        &self.best_chain
    }

    /// Look up a header by hash.
    pub fn header(&self, hash: &str) -> Option<&BlockHeader> {
        self.headers.get(hash)
    }

    /// Whether a header with this hash is known.
    pub fn has_header(&self, hash: &str) -> bool {
        self.headers.contains_key(hash)
    }

    /// Whether a block with this hash has been fully downloaded.
    pub fn has_block(&self, hash: &str) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Look up a full block by hash.
    pub fn block(&self, hash: &str) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// The number of admitted headers.
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    /// The number of downloaded blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The number of mempool transactions.
    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }

    /// All mempool transactions.
    pub fn mempool_values(&self) -> impl Iterator<Item = &Transaction> {
        self.mempool.values()
    }

    /// The subsequence of `best_chain` whose blocks haven't been
    /// downloaded yet, in chain order.
    pub fn missing_blocks(&self) -> Vec<String> {
        self.best_chain
            .iter()
            .filter(|hash| !self.blocks.contains_key(hash.as_str()))
            .cloned()
            .collect()
    }

    /// Answer a `getheaders{from_block}` request: the headers strictly
    /// after `from_block` in the best chain, up to `limit`. Returns an
    /// empty vector if `from_block` is not on the best chain (including
    /// when it is the current tip).
    pub fn headers_after(&self, from_block: &str, limit: usize) -> Vec<BlockHeader> {
        let Some(pos) = self.best_chain.iter().position(|h| h == from_block) else {
            return Vec::new();
        };
        self.best_chain[pos + 1..]
            .iter()
            .take(limit)
            .filter_map(|hash| self.headers.get(hash).cloned())
            .collect()
    }

    /// Answer a `getblocks{from_height}` request: the hashes of
    /// already-downloaded blocks in `[from_height, from_height + limit)` of
    /// the best chain.
    pub fn inventory_from_height(&self, from_height: Height, limit: usize) -> Vec<String> {
        let start = from_height as usize;
        self.best_chain
            .iter()
            .enumerate()
            .skip(start)
            .take(limit)
            .filter(|(_, hash)| self.blocks.contains_key(hash.as_str()))
            .map(|(_, hash)| hash.clone())
            .collect()
    }

    /// Seed the store with a small synthetic chain and mempool, for tests
    /// and for embedders that want to exercise the sync pipeline without a
    /// second pre-populated peer (see original `add_test_data` demo
    /// helper). `blocks` are appended on top of the current tip in order;
    /// each must declare the correct `prev_hash`/`height` itself.
    pub fn seed(&mut self, blocks: Vec<Block>, mempool: Vec<Transaction>) {
        for block in blocks {
            let header = block.header.clone();
            self.headers.insert(header.hash.clone(), header);
            self.blocks.insert(block.hash().to_string(), block);
        }
        for tx in mempool {
            self.mempool.insert(tx.tx_id.clone(), tx);
        }
        self.recompute_best_chain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(hash: &str, prev: &str, height: Height) -> BlockHeader {
        BlockHeader {
            hash: hash.to_string(),
            prev_hash: prev.to_string(),
            merkle_root: ZERO_HASH.to_string(),
            timestamp: 0,
            difficulty: 1,
            nonce: 0,
            height,
        }
    }

    #[test]
    fn starts_with_only_genesis() {
        let store = ChainStore::new(0);
        assert_eq!(store.chain_height(), 0);
        assert_eq!(store.chain_tip(), crate::block::GENESIS_HASH);
        assert_eq!(store.header_count(), 1);
        assert_eq!(store.block_count(), 1);
    }

    #[test]
    fn rejects_header_with_unknown_parent() {
        let mut store = ChainStore::new(0);
        let err = store
            .add_header(header("a", "does-not-exist", 1))
            .unwrap_err();
        assert!(matches!(err, ChainError::UnknownParent { .. }));
    }

    #[test]
    fn extends_best_chain_on_linear_headers() {
        let mut store = ChainStore::new(0);
        store
            .add_header(header("a", crate::block::GENESIS_HASH, 1))
            .unwrap();
        store.add_header(header("b", "a", 2)).unwrap();
        assert_eq!(store.chain_height(), 2);
        assert_eq!(store.chain_tip(), "b");
        assert_eq!(
            store.best_chain(),
            &[crate::block::GENESIS_HASH.to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn admitting_same_header_twice_is_a_no_op() {
        let mut store = ChainStore::new(0);
        let h = header("a", crate::block::GENESIS_HASH, 1);
        store.add_header(h.clone()).unwrap();
        let before = store.best_chain().to_vec();
        store.add_header(h).unwrap();
        assert_eq!(store.best_chain().to_vec(), before);
    }

    #[test]
    fn height_ties_break_on_lexicographically_smaller_hash() {
        let mut store = ChainStore::new(0);
        store
            .add_header(header("zzz", crate::block::GENESIS_HASH, 1))
            .unwrap();
        store
            .add_header(header("aaa", crate::block::GENESIS_HASH, 1))
            .unwrap();
        assert_eq!(store.chain_tip(), "aaa");
    }

    #[test]
    fn add_block_rejects_unknown_header() {
        let mut store = ChainStore::new(0);
        let block = Block {
            header: header("a", crate::block::GENESIS_HASH, 1),
            transactions: vec![],
        };
        assert!(matches!(
            store.add_block(block),
            Err(ChainError::HeaderMissing(_))
        ));
    }

    #[test]
    fn add_block_succeeds_once_header_known() {
        let mut store = ChainStore::new(0);
        let h = header("a", crate::block::GENESIS_HASH, 1);
        store.add_header(h.clone()).unwrap();
        let block = Block {
            header: h,
            transactions: vec![],
        };
        store.add_block(block).unwrap();
        assert!(store.has_block("a"));
        assert!(store.missing_blocks().is_empty());
    }

    #[test]
    fn add_block_accepts_a_zero_amount_transaction() {
        let mut store = ChainStore::new(0);
        let h = header("a", crate::block::GENESIS_HASH, 1);
        store.add_header(h.clone()).unwrap();
        let block = Block {
            header: h,
            transactions: vec![crate::block::Transaction {
                tx_id: "t".into(),
                sender: "s".into(),
                receiver: "r".into(),
                amount: 0.0,
                timestamp: 0,
            }],
        };
        store.add_block(block).unwrap();
        assert!(store.has_block("a"));
    }

    #[test]
    fn add_tx_rejects_non_positive_amount() {
        let mut store = ChainStore::new(0);
        let tx = Transaction {
            tx_id: "t".into(),
            sender: "s".into(),
            receiver: "r".into(),
            amount: 0.0,
            timestamp: 0,
        };
        assert!(store.add_tx(tx).is_err());
        assert_eq!(store.mempool_len(), 0);
    }

    #[test]
    fn headers_after_tip_is_empty() {
        let store = ChainStore::new(0);
        let tip = store.chain_tip().to_string();
        assert!(store.headers_after(&tip, 2000).is_empty());
    }

    #[test]
    fn headers_after_unknown_hash_is_empty() {
        let store = ChainStore::new(0);
        assert!(store.headers_after("nonexistent", 2000).is_empty());
    }
}
