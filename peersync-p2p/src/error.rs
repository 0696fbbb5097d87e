//! Error and disconnect-reason types for the peer-session and connection
//! layers.
use std::io;

use peersync_common::PeerEndpoint;
use thiserror::Error;

/// Why a dial attempt did not produce a connected session.
///
/// Dial failures are never fatal to the node: they are logged and folded
/// into a `false` return from [`crate::connmgr::manual_connect`] (which
/// calls [`crate::session::dial`] directly), and never taint the address
/// book.
#[derive(Debug, Error)]
pub enum DialError {
    /// The endpoint named our own listener.
    #[error("refusing to dial self at {0}")]
    SelfConnect(PeerEndpoint),
    /// The TCP connect attempt timed out.
    #[error("dial to {endpoint} timed out")]
    Timeout {
        /// The endpoint that did not answer in time.
        endpoint: PeerEndpoint,
    },
    /// The TCP connect attempt failed at the OS level.
    #[error("dial to {endpoint} failed: {source}")]
    Connect {
        /// The endpoint that refused or was unreachable.
        endpoint: PeerEndpoint,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The remote side did not complete the handshake in time or sent a
    /// malformed handshake message.
    #[error("handshake with {endpoint} failed: {reason}")]
    HandshakeFailed {
        /// The endpoint the handshake was attempted with.
        endpoint: PeerEndpoint,
        /// A human-readable description of the failure.
        reason: String,
    },
}

/// Why a previously established session was torn down.
///
/// Every variant here is terminal: the session closes, its endpoint is
/// removed from `connected` (but retained in `known`), and the reason is
/// logged, never surfaced to the embedder.
#[derive(Debug, Error)]
pub enum DisconnectReason {
    /// The remote side closed its write half cleanly.
    #[error("peer closed the connection")]
    Eof,
    /// A socket read or write failed at the OS level.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A received payload did not decode as a [`crate::message::Message`].
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The remote reported the same node identity as ours.
    #[error("peer reported our own node id")]
    SelfConnect,
    /// The session's outbound queue receiver was dropped before the writer
    /// task observed it, or the writer task itself has exited.
    #[error("outbound send queue closed")]
    QueueClosed,
    /// A consecutive pair of outbound writes failed.
    #[error("repeated write failure")]
    WriteFailed,
    /// The node was asked to stop and force-closed every session.
    #[error("node is stopping")]
    Shutdown,
}

impl DisconnectReason {
    /// Whether this reason reflects a transient condition that does not,
    /// by itself, warrant penalizing the peer (it still always closes the
    /// session; this flag is informational for logging/metrics).
    pub fn is_transient(&self) -> bool {
        matches!(self, DisconnectReason::Eof | DisconnectReason::Shutdown)
    }
}

/// Top-level error surfaced to an embedder from [`crate::NodeP2p::start`].
#[derive(Debug, Error)]
pub enum Error {
    /// The listener could not bind to the configured port.
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        /// The port that could not be bound.
        port: u16,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}
