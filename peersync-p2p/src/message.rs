//! The wire codec: a tagged JSON union over every message this protocol
//! exchanges.
//!
//! Each variant's `type` tag and field names match the reference encoding
//! byte-for-byte, so this implementation interoperates with any peer that
//! speaks the same JSON shape. There is no length-prefix framing: each
//! message is encoded as one compact JSON document and decoded from exactly
//! one socket read (see [`crate::session`]).

use peersync_common::{Block, BlockHeader, Transaction};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

/// The maximum number of headers returned in one `headers` response.
pub const MAX_HEADERS_PER_BATCH: usize = 2000;
/// The maximum number of hashes returned in one `inv` response.
pub const MAX_INV_PER_BATCH: usize = 500;
/// The maximum number of addresses returned in one `addr` response.
pub const MAX_ADDR_PER_BATCH: usize = 10;

/// One wire message. Tagged by `type`; `rename_all = "lowercase"` keeps the
/// tag and field casing identical to the reference JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Sent by the dialing side to open a handshake.
    Version {
        /// The sender's node identity.
        node_id: String,
        /// The sender's listening port.
        port: u16,
    },
    /// Sent by the accepting side to complete a handshake.
    Verack {
        /// The sender's node identity.
        node_id: String,
        /// The sender's listening port.
        port: u16,
    },
    /// A keep-alive liveness probe.
    Ping {
        /// The sender's node identity.
        node_id: String,
    },
    /// The informational reply to [`Message::Ping`].
    Pong {
        /// The sender's node identity.
        node_id: String,
    },
    /// Requests the recipient's known peer addresses.
    Getaddr {
        /// The sender's node identity.
        node_id: String,
    },
    /// A batch of known peer addresses, `host:port` textual form.
    Addr {
        /// Up to [`MAX_ADDR_PER_BATCH`] `host:port` strings.
        peers: Vec<String>,
        /// `peers.len()`, carried redundantly as in the reference encoding.
        count: usize,
    },
    /// Requests headers after `from_block` on the recipient's best chain.
    Getheaders {
        /// The hash to resume from.
        from_block: String,
        /// The sender's node identity.
        node_id: String,
    },
    /// A batch of headers answering a [`Message::Getheaders`] request.
    Headers {
        /// Up to [`MAX_HEADERS_PER_BATCH`] headers, in chain order.
        headers: Vec<BlockHeader>,
        /// `headers.len()`.
        count: usize,
    },
    /// Requests an inventory of downloaded blocks starting at a height.
    Getblocks {
        /// The starting height.
        from_height: u64,
        /// The sender's node identity.
        node_id: String,
    },
    /// A batch of block hashes the recipient already holds.
    Inv {
        /// Up to [`MAX_INV_PER_BATCH`] hashes.
        blocks: Vec<String>,
        /// `blocks.len()`.
        count: usize,
    },
    /// Requests the full block data for one hash.
    Getdata {
        /// The requested block's hash.
        block: String,
        /// The sender's node identity.
        node_id: String,
    },
    /// The full block data answering a [`Message::Getdata`] request.
    Block {
        /// The requested block.
        block: Block,
    },
    /// Requests the recipient's mempool contents.
    Mempool {
        /// The sender's node identity.
        node_id: String,
    },
    /// The recipient's mempool contents.
    Tx {
        /// The mempool transactions.
        transactions: Vec<Transaction>,
        /// `transactions.len()`.
        count: usize,
    },
}

impl Message {
    /// Encode this message as a single compact JSON document, with no
    /// trailing newline or length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode exactly one message from a byte slice (the contents of a
    /// single socket read).
    ///
    /// Returns `Ok(None)` for a well-formed JSON object carrying a `type`
    /// tag this implementation does not recognize: per the duck-typed
    /// dispatch the wire protocol assumes, an unknown tag is a no-op, not
    /// a reason to close the connection. Only genuinely malformed JSON
    /// (unparseable, or missing/non-string `type`) is an error.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let Some(tag) = value.get("type").and_then(serde_json::Value::as_str) else {
            return Err(serde_json::Error::custom("message is missing a string \"type\" field"));
        };
        if !KNOWN_TAGS.contains(&tag) {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }
}

const KNOWN_TAGS: &[&str] = &[
    "version",
    "verack",
    "ping",
    "pong",
    "getaddr",
    "addr",
    "getheaders",
    "headers",
    "getblocks",
    "inv",
    "getdata",
    "block",
    "mempool",
    "tx",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips_with_lowercase_tag() {
        let msg = Message::Version {
            node_id: "abcd1234".into(),
            port: 5001,
        };
        let bytes = msg.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "version");
        assert_eq!(json["port"], 5001);
        assert_eq!(Message::decode(&bytes).unwrap(), Some(msg));
    }

    #[test]
    fn unknown_type_decodes_as_a_no_op() {
        let bytes = br#"{"type":"notamessage"}"#;
        assert_eq!(Message::decode(bytes).unwrap(), None);
    }

    #[test]
    fn missing_type_field_fails_to_decode() {
        let bytes = br#"{"node_id":"abcd1234"}"#;
        assert!(Message::decode(bytes).is_err());
    }

    #[test]
    fn unparseable_json_fails_to_decode() {
        let bytes = b"not json";
        assert!(Message::decode(bytes).is_err());
    }

    #[test]
    fn addr_carries_redundant_count() {
        let msg = Message::Addr {
            peers: vec!["127.0.0.1:5001".into()],
            count: 1,
        };
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), Some(msg));
    }
}
