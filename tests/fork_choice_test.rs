//! Tip selection: longest all-valid branch, deterministic tie-breaking, and the exclusion of
//! validator-update subtrees the local node has not caught up past.

mod common;

use chained_bft::{
    chain::{Chain, ExtendedBlock},
    fork_choice::{tip_to_extend, tip_to_vote},
    types::{block::CommitCertificate, data_types::BlockHeight},
};

use common::*;

fn extend(
    chain: &Chain,
    kp: &chained_bft::types::crypto_primitives::Keypair,
    parent: &ExtendedBlock,
    epoch: u64,
) -> ExtendedBlock {
    let block = signed_block(kp, parent, epoch, CommitCertificate::new(parent.hash()));
    chain.add_block(block).unwrap()
}

#[test]
fn tip_selection_with_validator_update() {
    let kp = keypair();
    let chain = test_chain();
    let root = chain.root();

    // root <- a1 <- a2
    // root <- b1 <- b2 <- b3
    let a1 = extend(&chain, &kp, &root, 1);
    let a2 = extend(&chain, &kp, &a1, 2);
    let b1 = extend(&chain, &kp, &root, 3);
    let b2 = extend(&chain, &kp, &b1, 4);
    let b3 = extend(&chain, &kp, &b2, 5);

    // Nothing is marked valid yet, so only the root qualifies.
    assert_eq!(tip_to_vote(&chain).hash(), root.hash());

    for block in [&a1, &a2, &b1, &b2, &b3] {
        chain.mark_block_valid(&block.hash()).unwrap();
    }

    // The longest all-valid branch wins.
    assert_eq!(tip_to_vote(&chain).hash(), b3.hash());

    // b2 introduces a validator update above the local commit horizon (height 0): the whole b2
    // subtree is out of bounds for extension, while voting still follows the longest branch.
    chain.mark_block_has_validator_update(&b2.hash()).unwrap();
    assert_eq!(tip_to_extend(&chain, BlockHeight::new(0)).hash(), a2.hash());
    assert_eq!(tip_to_vote(&chain).hash(), b3.hash());

    // Once the local commit has caught up past the update, the b-branch is extendable again.
    assert_eq!(tip_to_extend(&chain, BlockHeight::new(2)).hash(), b3.hash());
}

#[test]
fn unvalidated_gaps_block_descendants() {
    let kp = keypair();
    let chain = test_chain();
    let root = chain.root();

    let b1 = extend(&chain, &kp, &root, 1);
    let b2 = extend(&chain, &kp, &b1, 2);

    // b2 is valid but b1 is not: the path from the root to b2 is broken, so neither qualifies.
    chain.mark_block_valid(&b2.hash()).unwrap();
    assert_eq!(tip_to_vote(&chain).hash(), root.hash());

    chain.mark_block_valid(&b1.hash()).unwrap();
    assert_eq!(tip_to_vote(&chain).hash(), b2.hash());
}

#[test]
fn equal_height_ties_break_on_lowest_hash() {
    let kp = keypair();
    let chain = test_chain();
    let root = chain.root();

    // Two sibling branches of the same height.
    let x = extend(&chain, &kp, &root, 1);
    let y = extend(&chain, &kp, &root, 2);
    chain.mark_block_valid(&x.hash()).unwrap();
    chain.mark_block_valid(&y.hash()).unwrap();

    let expected = if x.hash() < y.hash() { &x } else { &y };
    assert_eq!(tip_to_vote(&chain).hash(), expected.hash());

    // Deterministic: repeated evaluation gives the same verdict.
    for _ in 0..3 {
        assert_eq!(tip_to_vote(&chain).hash(), expected.hash());
    }
}
