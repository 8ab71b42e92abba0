/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for the pluggable validator manager, which maps block hashes to validator sets and
//! epochs to proposers.
//!
//! The validator manager is the source of truth for "who may do what" at any point of the chain
//! tree. It is always addressed by block hash: the engine queries it for the block under
//! consideration, and never caches the "current" set across re-orgs.

use crate::types::{
    data_types::{CryptoHash, Epoch},
    validator_set::{Validator, ValidatorSet},
};

/// Maps positions in the chain tree to validator sets and proposers.
pub trait ValidatorManager: Send + Sync + 'static {
    /// The validator authorized to propose the child of the block identified by `parent` in
    /// `epoch`.
    fn proposer(&self, parent: &CryptoHash, epoch: Epoch) -> Validator;

    /// The validator authorized to propose in the epoch after `epoch` on top of `parent`. Votes
    /// are addressed to this validator.
    fn next_proposer(&self, parent: &CryptoHash, epoch: Epoch) -> Validator;

    /// The validator set active at the block identified by `block`.
    fn validator_set(&self, block: &CryptoHash) -> ValidatorSet;

    /// The validator set that becomes active once the block identified by `block` and its
    /// validator update are committed.
    fn next_validator_set(&self, block: &CryptoHash) -> ValidatorSet;
}

/// A [`ValidatorManager`] over a fixed validator set, rotating proposership across epochs in
/// proportion to voting power.
///
/// Imagine an abstract array that contains `power(v)` entries for every validator `v`, arranged so
/// that validators with more power appear earlier and entries of the same validator are spread
/// apart. The proposer of epoch `e` is the validator at index `e % total_power` of this array.
/// This gives every validator a number of proposal slots per rotation proportional to its power,
/// interleaved rather than clustered.
pub struct StaticValidatorManager {
    validator_set: ValidatorSet,
}

impl StaticValidatorManager {
    /// Create a manager over `validator_set`.
    ///
    /// # Panics
    ///
    /// Panics if `validator_set` is empty.
    pub fn new(validator_set: ValidatorSet) -> Self {
        assert!(
            !validator_set.is_empty(),
            "the validator set cannot be empty"
        );
        Self { validator_set }
    }

    fn select(&self, epoch: Epoch) -> Validator {
        let p_total = self.validator_set.total_power().int() as u64;
        let n = self.validator_set.len();
        // Index in the abstract array. A set whose members all have zero power falls back to
        // unweighted rotation.
        let index = if p_total == 0 {
            return self.nth(epoch.int() as usize % n);
        } else {
            epoch.int() % p_total
        };
        let p_max = self
            .validator_set
            .validators_and_powers()
            .iter()
            .map(|(_, power)| power.int())
            .max()
            .expect("the validator set cannot be empty");

        let mut counter = 0;
        // Search for the validator at the given index in the abstract array of proposers.
        for threshold in 1..=p_max {
            for k in 0..n {
                let validator = self.nth(k);
                if validator.power.int() >= threshold {
                    if counter == index {
                        return validator;
                    }
                    counter += 1
                }
            }
        }

        unreachable!("the abstract proposer array has exactly total_power entries")
    }

    fn nth(&self, k: usize) -> Validator {
        let address = self.validator_set.validators().nth(k).unwrap();
        Validator::new(*address, *self.validator_set.power(address).unwrap())
    }
}

impl ValidatorManager for StaticValidatorManager {
    fn proposer(&self, _parent: &CryptoHash, epoch: Epoch) -> Validator {
        self.select(epoch)
    }

    fn next_proposer(&self, _parent: &CryptoHash, epoch: Epoch) -> Validator {
        self.select(epoch + 1)
    }

    fn validator_set(&self, _block: &CryptoHash) -> ValidatorSet {
        self.validator_set.clone()
    }

    fn next_validator_set(&self, _block: &CryptoHash) -> ValidatorSet {
        self.validator_set.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::{Power, ValidatorAddress};

    fn addr(byte: u8) -> ValidatorAddress {
        ValidatorAddress::new([byte; 32])
    }

    #[test]
    fn proposer_slots_are_proportional_to_power() {
        let mut set = ValidatorSet::new();
        set.put(&addr(1), Power::new(1));
        set.put(&addr(2), Power::new(3));
        let manager = StaticValidatorManager::new(set);

        let mut slots: std::collections::HashMap<ValidatorAddress, u64> = Default::default();
        for e in 0..4 {
            let proposer = manager.proposer(&CryptoHash::zero(), Epoch::new(e));
            *slots.entry(proposer.address).or_default() += 1;
        }

        assert_eq!(slots[&addr(1)], 1);
        assert_eq!(slots[&addr(2)], 3);
    }

    #[test]
    fn rotation_is_deterministic() {
        let mut set = ValidatorSet::new();
        set.put(&addr(1), Power::new(2));
        set.put(&addr(2), Power::new(2));
        let manager = StaticValidatorManager::new(set);

        for e in 0..8 {
            let epoch = Epoch::new(e);
            assert_eq!(
                manager.proposer(&CryptoHash::zero(), epoch),
                manager.proposer(&CryptoHash::zero(), epoch)
            );
        }
        assert_eq!(
            manager.next_proposer(&CryptoHash::zero(), Epoch::new(0)),
            manager.proposer(&CryptoHash::zero(), Epoch::new(1))
        );
    }
}
