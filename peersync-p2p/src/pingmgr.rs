//! The keep-alive service: a single periodic task that pings every
//! connected session.
use std::sync::Arc;

use crate::message::Message;
use crate::Shared;

/// Run the keep-alive tick until shutdown. Each tick sends a `ping` to
/// every currently connected session; a full socket write is attempted by
/// enqueuing onto the session's own send queue, so a stalled peer cannot
/// block the tick itself.
pub async fn run(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.config.keepalive_interval);
    let mut shutdown_rx = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                log::info!(target: "p2p::pingmgr", "keep-alive stopping");
                break;
            }
            _ = interval.tick() => {
                tick(&shared).await;
            }
        }
    }
}

async fn tick(shared: &Shared) {
    let senders: Vec<_> = {
        let sessions = shared.sessions.lock().await;
        sessions.values().map(|h| h.sender.clone()).collect()
    };
    let node_id = shared.node_id.as_str().to_string();
    for sender in senders {
        let _ = sender
            .send(Message::Ping {
                node_id: node_id.clone(),
            })
            .await;
    }
}
