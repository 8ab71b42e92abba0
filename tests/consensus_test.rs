//! End-to-end consensus: a set of nodes over a loopback network proposes, votes, collects
//! certificates, and commits under the three-in-a-row rule.

mod common;

use std::{
    collections::HashMap,
    sync::mpsc,
    time::{Duration, Instant},
};

use chained_bft::{
    event_bus::EventHandlers,
    networking::loopback::loopback_network,
    node::{Node, NodeConfiguration},
    types::data_types::{BlockHeight, CryptoHash},
};

use common::*;

#[test]
fn three_nodes_commit_the_same_chain() {
    let kps = keypairs(3);
    let manager = manager_of(&kps);
    let messengers = loopback_network(kps.iter().map(|kp| kp.address()));

    let (commits_tx, commits_rx) = mpsc::channel::<(usize, CryptoHash, BlockHeight)>();

    let nodes: Vec<Node> = kps
        .iter()
        .zip(messengers)
        .enumerate()
        .map(|(i, (kp, messenger))| {
            let mut config = NodeConfiguration::new(TEST_CHAIN, kp.clone());
            config.epoch_time = Duration::from_millis(100);

            let mut handlers = EventHandlers::logging_only(false);
            let commits_tx = commits_tx.clone();
            handlers.commit_block_handlers.user_defined_handler =
                Some(Box::new(move |event| {
                    let _ = commits_tx.send((i, event.block, event.height));
                }));

            Node::start(
                config,
                genesis(TEST_CHAIN),
                messenger,
                manager.clone(),
                handlers,
            )
        })
        .collect();

    // Wait for every node to commit at least one block, and record everything committed.
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut committed: HashMap<usize, BlockHeight> = HashMap::new();
    let mut by_height: HashMap<BlockHeight, CryptoHash> = HashMap::new();

    while committed.len() < nodes.len() {
        assert!(
            Instant::now() < deadline,
            "nodes failed to commit within the deadline; committed so far: {:?}",
            committed
        );
        if let Ok((node, block, height)) = commits_rx.recv_timeout(Duration::from_millis(200)) {
            // Safety: two commits at the same height must agree, across all nodes.
            let recorded = by_height.entry(height).or_insert(block);
            assert_eq!(
                *recorded, block,
                "conflicting commits at height {}",
                height
            );

            let best = committed.entry(node).or_insert(height);
            if height > *best {
                *best = height;
            }
        }
    }

    // Every committed block is a valid block in every node's chain store.
    for (height, block) in &by_height {
        for node in &nodes {
            let stored = node
                .chain()
                .find_block(block)
                .unwrap_or_else(|| panic!("committed block at height {} not stored", height));
            assert!(stored.valid());
            assert_eq!(stored.height(), *height);
        }
    }

    drop(nodes);
}
