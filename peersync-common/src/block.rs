//! The structural block/transaction data model.
//!
//! Validation here is intentionally structural (well-formedness and parent
//! linkage), never cryptographic: there is no proof-of-work check, no
//! signature verification, and no Merkle-root construction.

use serde::{Deserialize, Serialize};

/// The hash of the fixed, well-known genesis header: 64 ASCII zeroes.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The all-zero parent hash used by the genesis header.
pub const ZERO_HASH: &str = GENESIS_HASH;

/// Chain height, 0-indexed at genesis.
pub type Height = u64;

/// A minimal block header: ~80 bytes' worth of fields, Bitcoin-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hex-encoded hash identifying this header.
    pub hash: String,
    /// Hash of the parent header, or [`ZERO_HASH`] for genesis.
    pub prev_hash: String,
    /// Merkle root of the block's transactions (structural only; unchecked).
    pub merkle_root: String,
    /// Unix timestamp, in seconds.
    pub timestamp: u64,
    /// Difficulty; must be `>= 1`.
    pub difficulty: u64,
    /// Proof-of-work nonce (unchecked).
    pub nonce: u64,
    /// Height of this header in the chain it belongs to.
    pub height: Height,
}

impl BlockHeader {
    /// Construct the fixed genesis header.
    pub fn genesis(timestamp: u64) -> Self {
        Self {
            hash: GENESIS_HASH.to_string(),
            prev_hash: ZERO_HASH.to_string(),
            merkle_root: ZERO_HASH.to_string(),
            timestamp,
            difficulty: 1,
            nonce: 0,
            height: 0,
        }
    }
}

/// A minimal transaction: no script, no UTXO, just amount transfer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier.
    pub tx_id: String,
    /// Sending party.
    pub sender: String,
    /// Receiving party.
    pub receiver: String,
    /// Transferred amount; must be `> 0`.
    pub amount: f64,
    /// Unix timestamp, in seconds.
    pub timestamp: u64,
}

impl Transaction {
    /// Non-empty `tx_id`/`sender`/`receiver`. Shared by both validation
    /// paths; block-contained transactions stop here, while standalone
    /// (mempool) transactions additionally require a positive `amount`
    /// via [`Transaction::is_structurally_valid`].
    fn has_valid_identifiers(&self) -> bool {
        !self.tx_id.is_empty() && !self.sender.is_empty() && !self.receiver.is_empty()
    }

    /// Structural well-formedness for a standalone (mempool) transaction:
    /// non-empty identifiers and a positive amount.
    pub fn is_structurally_valid(&self) -> bool {
        self.has_valid_identifiers() && self.amount > 0.0
    }
}

/// A full block: header plus its ordered transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The block's header.
    pub header: BlockHeader,
    /// The block's transactions, in order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block's hash, taken from its header.
    pub fn hash(&self) -> &str {
        &self.header.hash
    }

    /// Structural well-formedness of every contained transaction: each
    /// needs non-empty `tx_id`/`sender`/`receiver`, but unlike a standalone
    /// mempool transaction, a block-contained transaction is not required
    /// to carry a positive `amount`. Does not check that the header itself
    /// is already known; that is the chain store's responsibility.
    pub fn has_valid_transactions(&self) -> bool {
        self.transactions.iter().all(Transaction::has_valid_identifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_zero_height_and_zero_parent() {
        let g = BlockHeader::genesis(0);
        assert_eq!(g.height, 0);
        assert_eq!(g.prev_hash, ZERO_HASH);
        assert_eq!(g.hash, GENESIS_HASH);
    }

    #[test]
    fn transaction_validity_checks_amount_and_fields() {
        let mut tx = Transaction {
            tx_id: "a".into(),
            sender: "b".into(),
            receiver: "c".into(),
            amount: 1.0,
            timestamp: 0,
        };
        assert!(tx.is_structurally_valid());
        tx.amount = 0.0;
        assert!(!tx.is_structurally_valid());
        tx.amount = 1.0;
        tx.sender.clear();
        assert!(!tx.is_structurally_valid());
    }

    #[test]
    fn block_transactions_do_not_require_a_positive_amount() {
        let block = Block {
            header: BlockHeader::genesis(0),
            transactions: vec![Transaction {
                tx_id: "a".into(),
                sender: "b".into(),
                receiver: "c".into(),
                amount: 0.0,
                timestamp: 0,
            }],
        };
        assert!(block.has_valid_transactions());
    }

    #[test]
    fn block_transactions_still_require_non_empty_identifiers() {
        let block = Block {
            header: BlockHeader::genesis(0),
            transactions: vec![Transaction {
                tx_id: "a".into(),
                sender: String::new(),
                receiver: "c".into(),
                amount: 0.0,
                timestamp: 0,
            }],
        };
        assert!(!block.has_valid_transactions());
    }
}
