//! Block sync: a node that receives a block with unresolvable references requests the missing
//! ancestors from its peers and validates the branch once they arrive.
//!
//! The test plays the role of the serving peer by hand: it holds the peer's messenger, answers
//! the node's inventory and block requests, and watches the node catch up.

mod common;

use std::time::{Duration, Instant};

use borsh::BorshDeserialize;
use chained_bft::{
    event_bus::EventHandlers,
    networking::{
        loopback::loopback_network,
        messages::{Envelope, CHANNEL_SYNC},
        messenger::Messenger,
    },
    node::{Node, NodeConfiguration},
    sync::messages::{BlockResponse, InventoryResponse, SyncMessage, SyncRequest, SyncResponse},
    types::block::CommitCertificate,
};

use common::*;

#[test]
fn missing_ancestors_are_fetched_and_validated() {
    // The chain is produced by a single validator; the syncing node is a listener outside the
    // validator set.
    let kp_validator = keypair();
    let kp_listener = keypair();
    let manager = manager_of(std::slice::from_ref(&kp_validator));

    let mut messengers = loopback_network(vec![kp_validator.address(), kp_listener.address()]);
    let listener_side = messengers.remove(1);
    let mut validator_side = messengers.remove(0);

    // The validator's chain, built outside the node under test.
    let source = test_chain();
    let root = source.root();
    let eb1 = source
        .add_block(signed_block(
            &kp_validator,
            &root,
            1,
            CommitCertificate::new(root.hash()),
        ))
        .unwrap();
    let eb2 = source
        .add_block(signed_block(
            &kp_validator,
            &eb1,
            2,
            CommitCertificate::new(eb1.hash()),
        ))
        .unwrap();
    let eb3 = source
        .add_block(signed_block(
            &kp_validator,
            &eb2,
            3,
            CommitCertificate::new(eb2.hash()),
        ))
        .unwrap();

    let node = Node::start(
        NodeConfiguration::new(TEST_CHAIN, kp_listener.clone()),
        genesis(TEST_CHAIN),
        listener_side,
        manager,
        EventHandlers::logging_only(false),
    );

    // Deliver only the head of the chain; its parent and grandparent are unknown to the node.
    let listener_address = kp_listener.address();
    assert!(validator_side.send(listener_address, Envelope::from(eb3.block())));

    // Serve the node's sync requests until it has validated the whole branch.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        assert!(
            Instant::now() < deadline,
            "the node did not sync the branch within the deadline"
        );

        if node
            .chain()
            .find_block(&eb3.hash())
            .is_some_and(|b| b.valid())
        {
            break;
        }

        let (_, envelope) = match validator_side.recv() {
            Some(received) => received,
            None => {
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
        };
        if envelope.channel_id != CHANNEL_SYNC {
            continue;
        }

        match SyncMessage::try_from_slice(&envelope.content) {
            Ok(SyncMessage::Request(SyncRequest::Block(request))) => {
                if let Some(block) = source.find_block(&request.block) {
                    validator_side.send(
                        listener_address,
                        Envelope::from(&SyncMessage::Response(SyncResponse::Block(
                            BlockResponse {
                                block: block.block().clone(),
                            },
                        ))),
                    );
                }
            }
            Ok(SyncMessage::Request(SyncRequest::Inventory(request))) => {
                let blocks =
                    source.blocks_in_height_range(request.start_height, request.limit as u64);
                validator_side.send(
                    listener_address,
                    Envelope::from(&SyncMessage::Response(SyncResponse::Inventory(
                        InventoryResponse { blocks },
                    ))),
                );
            }
            _ => {}
        }
    }

    // The entire branch arrived through sync and passed validation.
    for block in [&eb1, &eb2, &eb3] {
        let stored = node.chain().find_block(&block.hash()).unwrap();
        assert!(stored.valid());
    }

    drop(node);
}
