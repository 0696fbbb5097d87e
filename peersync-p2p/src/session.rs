//! Peer sessions: the handshake, the per-session read loop, and the
//! dedicated writer task that owns the socket's write half.
//!
//! Every outbound message, whether produced by the read loop itself (a
//! `pong` reply), the keep-alive service, or the sync engine, is enqueued
//! on the session's `mpsc` sender rather than written directly. Only the
//! writer task touches the socket, which is what gives every session a
//! total write order without requiring callers to hold a lock across an
//! `.await`.

use std::sync::Arc;

use peersync_common::PeerEndpoint;
use serde::de::Error as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{DialError, DisconnectReason};
use crate::message::Message;
use crate::syncmgr;
use crate::Shared;

/// Which side initiated this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We dialed out.
    Outbound,
    /// The remote side dialed us.
    Inbound,
}

/// The lifecycle stage of a session, tracked for the status surface and
/// diagnostics; sessions are only ever inserted into the shared session
/// map once they reach `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// An outbound TCP connect is in flight.
    Dialing,
    /// The `version`/`verack` exchange is in flight.
    Handshaking,
    /// The handshake completed; the read loop is active.
    Connected,
    /// The session has torn down.
    Closed,
}

/// What the rest of the node holds onto for a live session: the sender
/// half of its outbound queue, plus metadata for the status surface.
pub struct SessionHandle {
    pub(crate) sender: mpsc::Sender<Message>,
    pub direction: Direction,
    pub remote_node_id: String,
}

const READ_BUF_SIZE: usize = 4096;

/// Dial `endpoint` and complete the handshake. Returns as soon as the
/// handshake succeeds, having spawned the session's read loop and writer
/// task as background work — callers (including `manual_connect`) must
/// not block on the connection's lifetime, only on whether it was
/// established. Dial-time failures are returned without ever registering
/// the endpoint as connected.
pub async fn dial(shared: Arc<Shared>, endpoint: PeerEndpoint) -> Result<(), DialError> {
    if endpoint.is_loopback_host() && endpoint.port == shared.config.port {
        return Err(DialError::SelfConnect(endpoint));
    }

    let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    let stream = tokio::time::timeout(shared.config.dial_timeout, connect)
        .await
        .map_err(|_| DialError::Timeout {
            endpoint: endpoint.clone(),
        })?
        .map_err(|source| DialError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;

    log::debug!(target: "p2p::session", "dialed {endpoint}, starting handshake");
    let handshaken = handshake_outbound(&shared, stream, endpoint).await?;
    tokio::spawn(run_established(
        shared,
        handshaken.read_half,
        handshaken.write_half,
        handshaken.endpoint,
        handshaken.remote_node_id,
        Direction::Outbound,
    ));
    Ok(())
}

/// The result of a completed outbound handshake: a socket split into its
/// halves plus the endpoint and identity the remote side reported.
struct Handshaken {
    read_half: OwnedReadHalf,
    write_half: OwnedWriteHalf,
    endpoint: PeerEndpoint,
    remote_node_id: String,
}

async fn handshake_outbound(
    shared: &Arc<Shared>,
    stream: TcpStream,
    dialed: PeerEndpoint,
) -> Result<Handshaken, DialError> {
    let (mut read_half, mut write_half) = stream.into_split();

    write_message(
        &mut write_half,
        &Message::Version {
            node_id: shared.node_id.as_str().to_string(),
            port: shared.config.port,
        },
    )
    .await
    .map_err(|source| DialError::HandshakeFailed {
        endpoint: dialed.clone(),
        reason: source.to_string(),
    })?;

    let reply = tokio::time::timeout(
        shared.config.handshake_timeout,
        read_one_message(&mut read_half),
    )
    .await
    .map_err(|_| DialError::HandshakeFailed {
        endpoint: dialed.clone(),
        reason: "no verack within the handshake timeout".into(),
    })?
    .map_err(|source| DialError::HandshakeFailed {
        endpoint: dialed.clone(),
        reason: source.to_string(),
    })?;

    let Message::Verack { node_id, port } = reply else {
        return Err(DialError::HandshakeFailed {
            endpoint: dialed,
            reason: "expected verack".into(),
        });
    };

    if node_id == shared.node_id.as_str() {
        return Err(DialError::SelfConnect(dialed));
    }

    let endpoint = PeerEndpoint::new(dialed.host.clone(), port);
    Ok(Handshaken {
        read_half,
        write_half,
        endpoint,
        remote_node_id: node_id,
    })
}

/// Accept an inbound connection: read its `version`, reply `verack`, and
/// run the session to completion.
pub async fn accept(shared: Arc<Shared>, stream: TcpStream, peer_host: String) {
    let (mut read_half, mut write_half) = stream.into_split();

    let version = match tokio::time::timeout(
        shared.config.handshake_timeout,
        read_one_message(&mut read_half),
    )
    .await
    {
        Ok(Ok(msg)) => msg,
        Ok(Err(e)) => {
            log::debug!(target: "p2p::session", "inbound handshake from {peer_host} failed: {e}");
            return;
        }
        Err(_) => {
            log::debug!(target: "p2p::session", "inbound handshake from {peer_host} timed out");
            return;
        }
    };

    let Message::Version { node_id, port } = version else {
        log::debug!(target: "p2p::session", "inbound peer {peer_host} sent {version:?} before version");
        return;
    };

    if node_id == shared.node_id.as_str() {
        log::debug!(target: "p2p::session", "{peer_host}: {}", DisconnectReason::SelfConnect);
        return;
    }

    if write_message(
        &mut write_half,
        &Message::Verack {
            node_id: shared.node_id.as_str().to_string(),
            port: shared.config.port,
        },
    )
    .await
    .is_err()
    {
        return;
    }

    let endpoint = PeerEndpoint::new(peer_host, port);
    run_established(shared, read_half, write_half, endpoint, node_id, Direction::Inbound).await;
}

async fn run_established(
    shared: Arc<Shared>,
    mut read_half: OwnedReadHalf,
    write_half: OwnedWriteHalf,
    endpoint: PeerEndpoint,
    remote_node_id: String,
    direction: Direction,
) {
    let (tx, rx) = mpsc::channel(shared.config.send_queue_capacity);

    {
        let mut addrbook = shared.addrbook.lock().await;
        addrbook.mark_connected(endpoint.clone());
        let mut sessions = shared.sessions.lock().await;
        sessions.insert(
            endpoint.clone(),
            SessionHandle {
                sender: tx.clone(),
                direction,
                remote_node_id: remote_node_id.clone(),
            },
        );
    }

    log::info!(target: "p2p::session", "session established with {endpoint} ({direction:?})");

    tokio::spawn(writer_task(write_half, rx));

    if direction == Direction::Outbound {
        let _ = tx.send(Message::Getaddr {
            node_id: shared.node_id.as_str().to_string(),
        }).await;
    }

    syncmgr::on_session_established(shared.clone(), endpoint.clone());

    let mut shutdown_rx = shared.shutdown.subscribe();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                break DisconnectReason::Shutdown;
            }
            res = tokio::time::timeout(shared.config.read_idle_timeout, read_half.read(&mut buf)) => {
                match res {
                    Err(_elapsed) => {
                        if tx.send(Message::Ping { node_id: shared.node_id.as_str().to_string() }).await.is_err() {
                            break DisconnectReason::QueueClosed;
                        }
                        continue;
                    }
                    Ok(Ok(0)) => break DisconnectReason::Eof,
                    Ok(Ok(n)) => {
                        match Message::decode(&buf[..n]) {
                            Ok(Some(msg)) => dispatch(&shared, &endpoint, &tx, msg).await,
                            Ok(None) => {
                                log::debug!(target: "p2p::session", "ignoring unknown message tag from {endpoint}");
                            }
                            Err(e) => break DisconnectReason::Malformed(e),
                        }
                    }
                    Ok(Err(e)) => break DisconnectReason::Io(e),
                }
            }
        }
    };

    teardown(&shared, &endpoint, reason).await;
}

async fn dispatch(shared: &Arc<Shared>, from: &PeerEndpoint, tx: &mpsc::Sender<Message>, msg: Message) {
    match msg {
        Message::Ping { node_id } => {
            let _ = tx.send(Message::Pong { node_id }).await;
        }
        Message::Pong { .. } => {
            log::debug!(target: "p2p::session", "pong from {from}");
        }
        Message::Getaddr { .. } => {
            let peers = {
                let addrbook = shared.addrbook.lock().await;
                addrbook.sample_for_addr()
            };
            let peers: Vec<String> = peers.iter().map(|e| e.to_string()).collect();
            let count = peers.len();
            let _ = tx.send(Message::Addr { peers, count }).await;
        }
        Message::Addr { peers, .. } => {
            let parsed: Vec<PeerEndpoint> = peers.iter().filter_map(|s| s.parse().ok()).collect();
            {
                let mut addrbook = shared.addrbook.lock().await;
                addrbook.learn_many(parsed.clone());
            }
            crate::connmgr::maybe_dial_discovered(shared.clone(), parsed);
        }
        Message::Getheaders { from_block, .. } => {
            syncmgr::handle_getheaders(shared, from, &from_block).await;
        }
        Message::Headers { headers, .. } => {
            syncmgr::handle_headers(shared, from, headers).await;
        }
        Message::Getblocks { from_height, .. } => {
            syncmgr::handle_getblocks(shared, from, from_height).await;
        }
        Message::Inv { blocks, .. } => {
            syncmgr::handle_inv(shared, from, blocks).await;
        }
        Message::Getdata { block, .. } => {
            syncmgr::handle_getdata(shared, from, &block).await;
        }
        Message::Block { block } => {
            syncmgr::handle_block(shared, from, block).await;
        }
        Message::Mempool { .. } => {
            syncmgr::handle_mempool_request(shared, from).await;
        }
        Message::Tx { transactions, .. } => {
            syncmgr::handle_tx_batch(shared, from, transactions).await;
        }
        Message::Version { .. } | Message::Verack { .. } => {
            log::debug!(target: "p2p::session", "ignoring post-handshake {msg:?} from {from}");
        }
    }
}

async fn teardown(shared: &Arc<Shared>, endpoint: &PeerEndpoint, reason: DisconnectReason) {
    {
        let mut sessions = shared.sessions.lock().await;
        sessions.remove(endpoint);
    }
    {
        let mut addrbook = shared.addrbook.lock().await;
        addrbook.mark_disconnected(endpoint);
    }
    {
        let mut sync = shared.sync.lock().await;
        sync.syncing_with.remove(endpoint);
    }
    if reason.is_transient() {
        log::debug!(target: "p2p::session", "session with {endpoint} closed: {reason}");
    } else {
        log::warn!(target: "p2p::session", "session with {endpoint} closed: {reason}");
    }
}

async fn writer_task(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Message>) {
    let mut consecutive_failures = 0u8;
    while let Some(msg) = rx.recv().await {
        match write_message(&mut write_half, &msg).await {
            Ok(()) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                log::debug!(target: "p2p::session", "write failed: {e}");
                if consecutive_failures >= 2 {
                    log::warn!(target: "p2p::session", "{}", DisconnectReason::WriteFailed);
                    break;
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_message(write_half: &mut OwnedWriteHalf, msg: &Message) -> std::io::Result<()> {
    let bytes = msg
        .encode()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_half.write_all(&bytes).await
}

async fn read_one_message(read_half: &mut OwnedReadHalf) -> Result<Message, DisconnectReason> {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let n = read_half.read(&mut buf).await.map_err(DisconnectReason::Io)?;
    if n == 0 {
        return Err(DisconnectReason::Eof);
    }
    match Message::decode(&buf[..n]) {
        Ok(Some(msg)) => Ok(msg),
        // An unrecognized tag is a no-op on an established session, but
        // the handshake expects exactly one specific message; anything
        // else here still fails the handshake attempt.
        Ok(None) => Err(DisconnectReason::Malformed(serde_json::Error::custom(
            "unrecognized message type during handshake",
        ))),
        Err(e) => Err(DisconnectReason::Malformed(e)),
    }
}
