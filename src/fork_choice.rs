/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Selection of the chain tip an honest node should vote on or build upon.
//!
//! Both operations are read-only traversals over the chain tree from the root, linear in the
//! number of blocks held, and deterministic given the same store and flag configuration: among
//! equal-height candidates, ties break on the lexicographically lowest hash, so every honest node
//! looking at the same tree picks the same tip.

use crate::{
    chain::{Chain, ExtendedBlock},
    types::data_types::BlockHeight,
};

/// The highest block reachable from the root through valid blocks only: every block on the path
/// from the root to the returned block (inclusive) has its `valid` flag set.
///
/// Returns the root if no non-root block qualifies.
pub fn tip_to_vote(chain: &Chain) -> ExtendedBlock {
    best_valid_tip(chain, None)
}

/// Like [`tip_to_vote`], but additionally excludes every subtree rooted at a block that carries a
/// validator update the local node has not caught up past.
///
/// A node whose local highest committed certificate is below a validator-update block must not
/// propose extensions that would depend on the new validator set, so any block with the
/// `has_validator_update` flag and a height above `local_hcc_height` is skipped together with its
/// descendants.
pub fn tip_to_extend(chain: &Chain, local_hcc_height: BlockHeight) -> ExtendedBlock {
    best_valid_tip(chain, Some(local_hcc_height))
}

fn best_valid_tip(chain: &Chain, extend_past_updates_limit: Option<BlockHeight>) -> ExtendedBlock {
    let root = chain.root();
    let mut best = root.clone();
    let mut stack = vec![root];

    while let Some(block) = stack.pop() {
        if is_better(&block, &best) {
            best = block.clone();
        }

        for child_hash in chain.children(&block.hash()).iter() {
            let child = match chain.find_block(child_hash) {
                Some(child) => child,
                None => continue,
            };
            if !child.valid() {
                continue;
            }
            if let Some(hcc_height) = extend_past_updates_limit {
                if child.has_validator_update() && child.height() > hcc_height {
                    continue;
                }
            }
            stack.push(child);
        }
    }

    best
}

// Higher wins; at equal height, the lexicographically lower hash wins.
fn is_better(candidate: &ExtendedBlock, best: &ExtendedBlock) -> bool {
    candidate.height() > best.height()
        || (candidate.height() == best.height() && candidate.hash() < best.hash())
}
