//! End-to-end sync-pipeline scenarios: a seeded node feeds its headers,
//! blocks, and mempool to one or more empty peers through the full
//! headers → blocks → mempool → live pipeline.
use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

use peersync_common::{Block, BlockHeader, Transaction, GENESIS_HASH};
use peersync_p2p::{Config, NodeP2p};

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn node(port: u16) -> NodeP2p {
    let config = Config::new(port).with_bootstrap(vec![]);
    NodeP2p::new(config, 0)
}

fn hash_for(n: u8) -> String {
    format!("{:0>64}", n)
}

/// Three blocks on top of genesis plus three mempool transactions, for
/// seeding a node that another peer can sync against.
fn seed_fixture() -> (Vec<Block>, Vec<Transaction>) {
    let mut prev = GENESIS_HASH.to_string();
    let mut blocks = Vec::new();
    for height in 1..=3u64 {
        let hash = hash_for(height as u8);
        let header = BlockHeader {
            hash: hash.clone(),
            prev_hash: prev.clone(),
            merkle_root: hash_for(0),
            timestamp: 0,
            difficulty: 1,
            nonce: 0,
            height,
        };
        blocks.push(Block {
            header,
            transactions: Vec::new(),
        });
        prev = hash;
    }
    let mempool = (0..3)
        .map(|i| Transaction {
            tx_id: format!("mempool_tx_{i}"),
            sender: format!("addr_{i}"),
            receiver: format!("addr_{}", i + 1),
            amount: 10.0 + i as f64,
            timestamp: 0,
        })
        .collect();
    (blocks, mempool)
}

/// A seeded node feeds its full chain and mempool to an empty peer that
/// dials it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn seed_only_sync_converges_to_live() {
    let port_a = free_port();
    let port_b = free_port();

    let mut a = node(port_a);
    let (blocks, mempool) = seed_fixture();
    a.seed_chain(blocks, mempool).await;
    a.start().await.unwrap();

    let mut b = node(port_b);
    b.start().await.unwrap();
    assert!(b.manual_connect("127.0.0.1", port_a).await);

    let mut converged = false;
    for _ in 0..150 {
        let sb = b.status().await;
        if sb.sync_mode == peersync_p2p::SyncMode::Live && sb.missing_block_count == 0 {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(converged, "node B did not converge to live within the timeout");

    let sa = a.status().await;
    let sb = b.status().await;
    assert_eq!(sb.chain_height, 3);
    assert_eq!(sb.chain_height, sa.chain_height);
    assert_eq!(sb.chain_tip, sa.chain_tip);
    assert_eq!(sb.block_count, 4);
    assert_eq!(sb.mempool_count, 3);

    a.stop().await;
    b.stop().await;
}

/// Two empty peers dialing the same seeded node (a star topology) each
/// converge to the identical best chain.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn star_sync_converges_all_peers_to_same_chain() {
    let port_a = free_port();
    let port_b = free_port();
    let port_c = free_port();

    let mut a = node(port_a);
    let (blocks, mempool) = seed_fixture();
    a.seed_chain(blocks, mempool).await;
    a.start().await.unwrap();

    let mut b = node(port_b);
    let mut c = node(port_c);
    b.start().await.unwrap();
    c.start().await.unwrap();
    assert!(b.manual_connect("127.0.0.1", port_a).await);
    assert!(c.manual_connect("127.0.0.1", port_a).await);

    let mut converged = false;
    for _ in 0..200 {
        let sb = b.status().await;
        let sc = c.status().await;
        if sb.chain_height == 3 && sc.chain_height == 3 {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(converged, "peers did not converge within the timeout");

    let sa = a.status().await;
    let sb = b.status().await;
    let sc = c.status().await;
    assert_eq!(sb.chain_tip, sa.chain_tip);
    assert_eq!(sc.chain_tip, sa.chain_tip);

    a.stop().await;
    b.stop().await;
    c.stop().await;
}
