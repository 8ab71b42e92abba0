/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its methods.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;

use super::{
    crypto_primitives::{verify_signature, CryptoHasher, Keypair},
    data_types::{
        BlockHeight, ChainID, CryptoHash, Epoch, SignatureBytes, Timestamp, ValidatorAddress,
    },
    voting::VoteSet,
};

/// A signed block proposal.
///
/// Every field except `signature` is part of the signed payload. A block's
/// [`hash`](Self::hash) is the SHA256 digest of the Borsh encoding of that payload, so the hash is
/// deterministic across implementations and the signature commits to all of the block's contents.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    /// Identifier of the chain this block belongs to.
    pub chain_id: ChainID,

    /// `parent`'s height plus 1.
    pub height: BlockHeight,

    /// The round in which this block was proposed. Strictly greater than the parent's epoch.
    pub epoch: Epoch,

    /// Hash of the parent block.
    pub parent: CryptoHash,

    /// Reference to the highest block the proposer believes is committed, together with the votes
    /// justifying it when the protocol requires them.
    pub hcc: CommitCertificate,

    /// Address of the proposer that signed this block.
    pub proposer: ValidatorAddress,

    /// Seconds since the Unix epoch at production time. Non-zero.
    pub timestamp: Timestamp,

    /// The proposer's signature over [`sign_bytes`](Self::sign_bytes).
    pub signature: SignatureBytes,
}

impl Block {
    /// Create a block signed by `keypair`, whose `proposer` field is `keypair`'s address.
    pub fn new_signed(
        keypair: &Keypair,
        chain_id: ChainID,
        height: BlockHeight,
        epoch: Epoch,
        parent: CryptoHash,
        hcc: CommitCertificate,
        timestamp: Timestamp,
    ) -> Block {
        let mut block = Block {
            chain_id,
            height,
            epoch,
            parent,
            hcc,
            proposer: keypair.address(),
            timestamp,
            signature: SignatureBytes::zero(),
        };
        block.signature = keypair.sign(&block.sign_bytes());
        block
    }

    /// The Borsh encoding of every field except `signature`, in declaration order.
    pub fn payload_bytes(&self) -> Vec<u8> {
        (
            &self.chain_id,
            &self.height,
            &self.epoch,
            &self.parent,
            &self.hcc,
            &self.proposer,
            &self.timestamp,
        )
            .try_to_vec()
            .expect("serializing a block payload into a Vec never fails")
    }

    /// The hash of this block: the SHA256 digest of [`payload_bytes`](Self::payload_bytes).
    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.payload_bytes());
        CryptoHash::new(hasher.finalize().into())
    }

    /// The bytes that the proposer signs: the block [`hash`](Self::hash), i.e., the digest of the
    /// payload with the signature omitted.
    pub fn sign_bytes(&self) -> Vec<u8> {
        self.hash().bytes().to_vec()
    }

    /// Verify the block's signature against the key behind its `proposer` address.
    pub fn is_correctly_signed(&self) -> bool {
        verify_signature(&self.proposer, &self.sign_bytes(), &self.signature)
    }
}

/// Reference inside a block to the highest prior block the proposer believes is committed.
///
/// The commit certificate forms the safety backbone of the chained commit rule: validation
/// constrains how far back it may point relative to the block's parent, and across validator-set
/// updates it must carry the `votes` that justify the referenced block (see
/// [`validation`](crate::validation)).
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitCertificate {
    /// Hash of the certified block. Must be an ancestor of the carrying block's parent
    /// (inclusive).
    pub block_hash: CryptoHash,

    /// Votes justifying `block_hash`, present when required by the validation rules.
    pub votes: Option<VoteSet>,
}

impl CommitCertificate {
    /// Create a certificate referencing `block_hash` without any carried votes.
    pub fn new(block_hash: CryptoHash) -> Self {
        Self {
            block_hash,
            votes: None,
        }
    }

    /// Create a certificate referencing `block_hash` justified by `votes`.
    pub fn with_votes(block_hash: CryptoHash, votes: VoteSet) -> Self {
        Self {
            block_hash,
            votes: Some(votes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::voting::Vote;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn keypair() -> Keypair {
        Keypair::new(SigningKey::generate(&mut OsRng))
    }

    fn test_block(keypair: &Keypair) -> Block {
        Block::new_signed(
            keypair,
            ChainID::new(7),
            BlockHeight::new(1),
            Epoch::new(1),
            CryptoHash::new([3; 32]),
            CommitCertificate::new(CryptoHash::new([3; 32])),
            Timestamp::new(1_700_000_000),
        )
    }

    #[test]
    fn borsh_round_trip_preserves_block_and_hash() {
        let keypair = keypair();
        let mut block = test_block(&keypair);

        let mut votes = VoteSet::new();
        votes.add(Vote::new(&keypair, block.hcc.block_hash, Epoch::new(1)));
        block.hcc.votes = Some(votes);

        let encoded = block.try_to_vec().unwrap();
        let decoded = Block::try_from_slice(&encoded).unwrap();

        assert!(decoded == block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn signature_covers_every_payload_field() {
        let keypair = keypair();
        let block = test_block(&keypair);
        assert!(block.is_correctly_signed());

        let mut tampered = block.clone();
        tampered.epoch = Epoch::new(2);
        assert!(!tampered.is_correctly_signed());

        let mut tampered = block;
        tampered.hcc = CommitCertificate::new(CryptoHash::new([4; 32]));
        assert!(!tampered.is_correctly_signed());
    }
}
