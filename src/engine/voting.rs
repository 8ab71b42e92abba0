/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Incremental aggregation of votes into commit certificates.

use std::collections::HashMap;

use crate::types::{
    data_types::{CryptoHash, Epoch, TotalPower},
    validator_set::ValidatorSet,
    voting::{Vote, VoteSet},
};

/// Number of independent maps the aggregator spreads `{block, epoch}` keys over.
const SHARD_COUNT: usize = 16;

/// Serves to incrementally form commit certificates by combining votes for the same block and
/// epoch from members of the block's validator set.
///
/// Pending vote sets are sharded by `{block, epoch}` so that keys for unrelated blocks live in
/// separate maps.
pub(crate) struct VoteAggregator {
    shards: Vec<HashMap<(CryptoHash, Epoch), PendingVotes>>,
}

struct PendingVotes {
    votes: VoteSet,
    power: TotalPower,
}

impl VoteAggregator {
    pub(crate) fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| HashMap::new()).collect(),
        }
    }

    /// Add `vote` to the pending set for its `{block, epoch}` pair, returning the accumulated
    /// vote set if adding the vote makes the set reach a quorum of `validator_set`.
    ///
    /// Votes from signers outside `validator_set`, and duplicate votes by the same signer, are
    /// no-ops.
    ///
    /// # Preconditions
    ///
    /// `vote.is_correct()`, and `validator_set` is the set active at `vote.block`.
    pub(crate) fn collect(
        &mut self,
        validator_set: &ValidatorSet,
        vote: Vote,
    ) -> Option<VoteSet> {
        let voter_power = match validator_set.power(&vote.id) {
            Some(power) => *power,
            None => return None,
        };

        let key = (vote.block, vote.epoch);
        let shard = &mut self.shards[shard_index(&vote.block)];
        let pending = shard.entry(key).or_insert_with(|| PendingVotes {
            votes: VoteSet::new(),
            power: TotalPower::new(0),
        });

        // A duplicate by the same voter does not add power.
        if !pending.votes.add(vote) {
            return None;
        }
        pending.power += voter_power;

        if pending.power >= validator_set.quorum() {
            let pending = shard.remove(&key).unwrap();
            return Some(pending.votes);
        }

        None
    }
}

fn shard_index(block: &CryptoHash) -> usize {
    block.bytes()[0] as usize % SHARD_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{crypto_primitives::Keypair, data_types::Power};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn keypairs(n: usize) -> Vec<Keypair> {
        (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut OsRng)))
            .collect()
    }

    fn set_of(keypairs: &[Keypair]) -> ValidatorSet {
        let mut set = ValidatorSet::new();
        for keypair in keypairs {
            set.put(&keypair.address(), Power::new(1));
        }
        set
    }

    #[test]
    fn quorum_forms_at_two_thirds_power() {
        let keypairs = keypairs(4);
        let set = set_of(&keypairs);
        let block = CryptoHash::new([1; 32]);
        let epoch = Epoch::new(1);
        let mut aggregator = VoteAggregator::new();

        // Total power 4, quorum 3: the first two votes do not form a certificate.
        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[0], block, epoch))
            .is_none());
        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[1], block, epoch))
            .is_none());

        let certificate = aggregator
            .collect(&set, Vote::new(&keypairs[2], block, epoch))
            .expect("three of four unit-power votes form a quorum");
        assert_eq!(certificate.len(), 3);
    }

    #[test]
    fn duplicate_and_foreign_votes_add_no_power() {
        let keypairs = keypairs(3);
        let set = set_of(&keypairs[..2]);
        let block = CryptoHash::new([2; 32]);
        let epoch = Epoch::new(1);
        let mut aggregator = VoteAggregator::new();

        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[0], block, epoch))
            .is_none());
        // Same voter again: no-op.
        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[0], block, epoch))
            .is_none());
        // Signer outside the validator set: no-op.
        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[2], block, epoch))
            .is_none());
        // Total power 2, quorum 2: the second distinct member completes it.
        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[1], block, epoch))
            .is_some());
    }

    #[test]
    fn votes_for_different_epochs_do_not_mix() {
        let keypairs = keypairs(2);
        let set = set_of(&keypairs);
        let block = CryptoHash::new([3; 32]);
        let mut aggregator = VoteAggregator::new();

        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[0], block, Epoch::new(1)))
            .is_none());
        assert!(aggregator
            .collect(&set, Vote::new(&keypairs[1], block, Epoch::new(2)))
            .is_none());
    }
}
