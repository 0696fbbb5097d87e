//! The error surface returned from [`crate::Node::start`].
use thiserror::Error;

/// Errors surfaced to an embedder. Every other internal failure mode is
/// handled locally by the peer-session and sync layers and never reaches
/// this type.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying P2P layer failed to start.
    #[error(transparent)]
    P2p(#[from] peersync_p2p::Error),
}
