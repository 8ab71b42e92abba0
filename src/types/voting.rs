/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Votes and vote sets.
//!
//! A [`Vote`] is a single validator's digitally signed, non-repudiable agreement that a particular
//! block should be committed in a particular epoch. Votes are aggregated into [`VoteSet`]s, which
//! hold at most one vote per voter per `{block, epoch}` pair. A vote set whose accumulated voting
//! power reaches a [quorum](crate::types::validator_set::ValidatorSet::quorum) serves as a commit
//! certificate, and may be carried inside a future block's
//! [`hcc`](crate::types::block::Block::hcc).

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{verify_signature, Keypair},
    data_types::{CryptoHash, Epoch, SignatureBytes, ValidatorAddress},
};

/// A single validator's signed statement that `block` should be committed in `epoch`.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    /// Address of the voter.
    pub id: ValidatorAddress,

    /// Hash of the block being voted for.
    pub block: CryptoHash,

    /// Epoch in which the vote was cast.
    pub epoch: Epoch,

    /// The voter's signature over [`message_bytes`](Self::message_bytes).
    pub signature: SignatureBytes,
}

impl Vote {
    /// Create a `Vote` for the given `block` and `epoch` by signing over the values with the
    /// provided `keypair`.
    pub fn new(keypair: &Keypair, block: CryptoHash, epoch: Epoch) -> Self {
        let message_bytes = Self::signed_payload(&block, &epoch);
        let signature = keypair.sign(&message_bytes);
        Self {
            id: keypair.address(),
            block,
            epoch,
            signature,
        }
    }

    /// Get the bytes that are passed as input into the signing function to form the signature of
    /// this `Vote`.
    pub fn message_bytes(&self) -> Vec<u8> {
        Self::signed_payload(&self.block, &self.epoch)
    }

    /// Verify that this vote's signature was created by the key behind [`id`](Self::id).
    pub fn is_correct(&self) -> bool {
        verify_signature(&self.id, &self.message_bytes(), &self.signature)
    }

    fn signed_payload(block: &CryptoHash, epoch: &Epoch) -> Vec<u8> {
        (block, epoch)
            .try_to_vec()
            .expect("serializing a (hash, epoch) pair into a Vec never fails")
    }
}

/// An aggregation of [`Vote`]s keyed by voter address.
///
/// `VoteSet` maintains the invariant that it contains at most one vote per voter per
/// `{block, epoch}` pair: [`add`](Self::add)-ing a second vote by the same voter for the same pair
/// is a no-op. Votes are kept in insertion order so that the Borsh encoding of a vote set is
/// deterministic.
#[derive(Clone, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct VoteSet(Vec<Vote>);

impl VoteSet {
    /// Create an empty `VoteSet`.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add `vote` to the set. Returns `false` (and leaves the set unchanged) if a vote by the same
    /// voter for the same `{block, epoch}` pair is already present.
    pub fn add(&mut self, vote: Vote) -> bool {
        if self.contains(&vote.id, &vote.block, &vote.epoch) {
            return false;
        }
        self.0.push(vote);
        true
    }

    /// Check whether the set holds a vote by `id` for the given `{block, epoch}` pair.
    pub fn contains(&self, id: &ValidatorAddress, block: &CryptoHash, epoch: &Epoch) -> bool {
        self.0
            .iter()
            .any(|v| &v.id == id && &v.block == block && &v.epoch == epoch)
    }

    /// Iterate through the votes in this set in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Vote> {
        self.0.iter()
    }

    /// Get the number of votes in this set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this set contains no votes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn keypair() -> Keypair {
        Keypair::new(SigningKey::generate(&mut OsRng))
    }

    #[test]
    fn vote_signature_verifies() {
        let keypair = keypair();
        let vote = Vote::new(&keypair, CryptoHash::new([1; 32]), Epoch::new(3));
        assert!(vote.is_correct());

        let mut tampered = vote.clone();
        tampered.epoch = Epoch::new(4);
        assert!(!tampered.is_correct());
    }

    #[test]
    fn vote_set_deduplicates_by_voter() {
        let keypair = keypair();
        let block = CryptoHash::new([2; 32]);
        let mut votes = VoteSet::new();

        assert!(votes.add(Vote::new(&keypair, block, Epoch::new(1))));
        assert!(!votes.add(Vote::new(&keypair, block, Epoch::new(1))));
        assert_eq!(votes.len(), 1);

        // A vote by the same voter for a different epoch is a distinct vote.
        assert!(votes.add(Vote::new(&keypair, block, Epoch::new(2))));
        assert_eq!(votes.len(), 2);
    }
}
