/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Rules that decide whether a freshly received block is admissible with respect to its parent and
//! the chain it extends.
//!
//! The entry point is [`validate_block`], a pure predicate: it performs no I/O, never mutates the
//! chain store, and reads only immutable block fields and already-set flags, so repeated calls
//! with unchanged inputs return the same verdict. [`check_block`] is the same check but names the
//! violated rule, which the [engine](crate::engine) logs.
//!
//! # The rules
//!
//! A candidate block is checked against its parent in the following order, failing closed on the
//! first violation:
//!
//! 1. **Well-formedness.** The chain ID matches, the height is the parent's plus one, the epoch is
//!    strictly greater than the parent's, and the parent reference, commit certificate reference,
//!    proposer, and timestamp are all non-zero.
//! 2. **Signature.** The signature verifies against the proposer's key over the block's signed
//!    payload.
//! 3. **Proposer authority.** The proposer is the one the
//!    [validator manager](crate::validator_manager) assigns to `(parent, epoch)`.
//! 4. **Parent validity.** The parent has been verified. A candidate whose parent is still
//!    unverified is not (yet) admissible; it may become admissible later when the parent is marked
//!    valid.
//! 5. **Commit certificate legitimacy.** How far back the certificate may point depends on where
//!    the closest validator-set update sits relative to the parent; see
//!    [the next section](#commit-certificates-across-validator-set-updates).
//! 6. **Vote set shape.** Whenever the certificate carries votes: every vote names the certified
//!    block, every signature verifies, voters are distinct, and every voter belongs to the
//!    validator set active at the certified block.
//!
//! # Commit certificates across validator-set updates
//!
//! Let `U` be the closest ancestor of the parent (inclusive) whose
//! [`has_validator_update`](crate::chain::ExtendedBlock::has_validator_update) flag is set,
//! searched over the parent, the parent's parent, and the parent's grandparent. A validator-set
//! update further back is already committed by the three-chain rule, so it no longer constrains
//! the certificate. The constraint by position of `U`:
//!
//! - **No `U` in the window**: the certificate may name any ancestor of the parent (inclusive).
//! - **`U` is the parent**: the certificate must name the parent itself. The update takes effect
//!   only once the chain builds directly on it, so the certificate may not reach around it.
//! - **`U` is the parent's parent**: the certificate must name the parent (the update block's
//!   child) *and* carry votes forming a quorum of the validator set active at that block. The
//!   votes prove to the old validator set that the new one has taken over; a certificate pointing
//!   at `U` or past it is rejected.
//! - **`U` is the parent's grandparent**: the certificate may name the parent or the update
//!   block's child without votes; naming `U` itself requires a quorum vote set; anything older is
//!   rejected.

use crate::{
    chain::{Chain, ExtendedBlock},
    types::{
        block::Block,
        data_types::{CryptoHash, TotalPower},
        voting::VoteSet,
    },
    validator_manager::ValidatorManager,
};

/// The number of generations above the parent (inclusive) within which a validator-set update
/// constrains a candidate's commit certificate.
const VALIDATOR_UPDATE_WINDOW: usize = 3;

/// The ways a candidate block can fail [`check_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockValidationError {
    /// The candidate names a different chain than the local one.
    WrongChainID,

    /// `parent` is not the block that `candidate.parent` names.
    MismatchedParent,

    /// The candidate's height is not the parent's height plus one.
    WrongHeight,

    /// The candidate's epoch is not strictly greater than the parent's.
    EpochNotIncreasing,

    /// The candidate's parent reference is the zero hash.
    MissingParent,

    /// The candidate's commit certificate reference is the zero hash.
    MissingCommitCertificate,

    /// The candidate's proposer is the zero address.
    MissingProposer,

    /// The candidate's timestamp is zero.
    MissingTimestamp,

    /// The signature does not verify against the proposer's key.
    InvalidSignature,

    /// The proposer is not the validator assigned to `(parent, epoch)`.
    NotProposer,

    /// The parent has not been marked valid.
    ParentNotValid,

    /// The commit certificate does not reference an ancestor of the parent.
    CertificateNotAncestorOfParent,

    /// The commit certificate reaches past a validator-set update it must acknowledge.
    CertificateSkipsValidatorUpdate,

    /// The configuration requires the commit certificate to carry votes, but it carries none.
    CertificateMissingVotes,

    /// The carried votes do not form a quorum of the validator set at the certified block.
    CertificateVotesBelowQuorum,

    /// A carried vote names a block other than the certified block.
    VoteForWrongBlock,

    /// A carried vote's signature does not verify against its voter's key.
    InvalidVoteSignature,

    /// Two carried votes share a voter.
    DuplicateVoter,

    /// A carried vote's voter is not in the validator set at the certified block.
    VoterNotInValidatorSet,
}

/// Check whether `candidate` is admissible on top of `parent`.
///
/// `parent` must be the stored block whose hash equals `candidate.parent`.
pub fn validate_block<V: ValidatorManager>(
    chain: &Chain,
    validator_manager: &V,
    candidate: &Block,
    parent: &ExtendedBlock,
) -> bool {
    check_block(chain, validator_manager, candidate, parent).is_ok()
}

/// Like [`validate_block`], but names the violated rule.
pub fn check_block<V: ValidatorManager>(
    chain: &Chain,
    validator_manager: &V,
    candidate: &Block,
    parent: &ExtendedBlock,
) -> Result<(), BlockValidationError> {
    use BlockValidationError::*;

    // 1. Well-formedness.
    if candidate.chain_id != chain.chain_id() {
        return Err(WrongChainID);
    }
    if candidate.parent != parent.hash() {
        return Err(MismatchedParent);
    }
    if candidate.height != parent.height() + 1 {
        return Err(WrongHeight);
    }
    if candidate.epoch <= parent.epoch() {
        return Err(EpochNotIncreasing);
    }
    if candidate.parent.is_zero() {
        return Err(MissingParent);
    }
    if candidate.hcc.block_hash.is_zero() {
        return Err(MissingCommitCertificate);
    }
    if candidate.proposer.is_zero() {
        return Err(MissingProposer);
    }
    if candidate.timestamp.is_zero() {
        return Err(MissingTimestamp);
    }

    // 2. Signature.
    if !candidate.is_correctly_signed() {
        return Err(InvalidSignature);
    }

    // 3. Proposer authority.
    let assigned = validator_manager.proposer(&candidate.parent, candidate.epoch);
    if assigned.address != candidate.proposer {
        return Err(NotProposer);
    }

    // 4. Parent validity.
    if !parent.valid() {
        return Err(ParentNotValid);
    }

    // 5. Commit certificate legitimacy under validator-update constraints.
    check_commit_certificate(chain, validator_manager, candidate, parent)?;

    // 6. Vote set shape, whenever votes are carried (required by rule 5 or not).
    if let Some(votes) = &candidate.hcc.votes {
        check_vote_set(validator_manager, &candidate.hcc.block_hash, votes)?;
    }

    Ok(())
}

/// Enforce the positional constraints on `candidate.hcc` described in the
/// [module-level docs](self#commit-certificates-across-validator-set-updates).
fn check_commit_certificate<V: ValidatorManager>(
    chain: &Chain,
    validator_manager: &V,
    candidate: &Block,
    parent: &ExtendedBlock,
) -> Result<(), BlockValidationError> {
    use BlockValidationError::*;

    let hcc = &candidate.hcc;

    let window = update_constraint_window(chain, parent);
    let update_depth = window.iter().position(|b| b.has_validator_update());

    match update_depth {
        // No update in the window: the certificate may name any ancestor of the parent.
        None => {
            if !chain.is_ancestor(&hcc.block_hash, &parent.hash()) {
                return Err(CertificateNotAncestorOfParent);
            }
        }

        // The parent introduces the update: the certificate must name the parent.
        Some(0) => {
            if hcc.block_hash != parent.hash() {
                return Err(CertificateSkipsValidatorUpdate);
            }
        }

        // The update is one generation above the parent: the certificate must name the update
        // block's child (the parent) and prove it with a quorum of votes.
        Some(1) => {
            if hcc.block_hash != parent.hash() {
                return Err(CertificateSkipsValidatorUpdate);
            }
            require_quorum_votes(validator_manager, hcc.block_hash, hcc.votes.as_ref())?;
        }

        // The update is two generations above the parent: the certificate may name the parent or
        // the update block's child freely, the update block itself only with a quorum of votes,
        // and nothing older.
        Some(2) => {
            let updates_child = window[1].hash();
            let update_block = window[2].hash();
            if hcc.block_hash == parent.hash() || hcc.block_hash == updates_child {
                // No votes required.
            } else if hcc.block_hash == update_block {
                require_quorum_votes(validator_manager, hcc.block_hash, hcc.votes.as_ref())?;
            } else {
                return Err(CertificateSkipsValidatorUpdate);
            }
        }

        Some(_) => unreachable!("the ancestor window holds at most three blocks"),
    }

    Ok(())
}

/// The window of ancestors within which a validator-set update constrains a candidate's commit
/// certificate: `parent`, `parent`'s parent, and `parent`'s grandparent (as available), in that
/// order.
pub(crate) fn update_constraint_window(chain: &Chain, parent: &ExtendedBlock) -> Vec<ExtendedBlock> {
    let mut window: Vec<ExtendedBlock> = Vec::with_capacity(VALIDATOR_UPDATE_WINDOW);
    let mut current = Some(parent.clone());
    while let Some(block) = current {
        let parent_hash = block.parent();
        window.push(block);
        current = if window.len() < VALIDATOR_UPDATE_WINDOW {
            chain.find_block(&parent_hash)
        } else {
            None
        };
    }
    window
}

/// Require `votes` to be present, well-shaped, and to accumulate at least a quorum of the voting
/// power of the validator set active at `target`.
fn require_quorum_votes<V: ValidatorManager>(
    validator_manager: &V,
    target: CryptoHash,
    votes: Option<&VoteSet>,
) -> Result<(), BlockValidationError> {
    let votes = match votes {
        Some(votes) if !votes.is_empty() => votes,
        _ => return Err(BlockValidationError::CertificateMissingVotes),
    };
    let power = check_vote_set(validator_manager, &target, votes)?;
    let validator_set = validator_manager.validator_set(&target);
    if power < validator_set.quorum() {
        return Err(BlockValidationError::CertificateVotesBelowQuorum);
    }
    Ok(())
}

/// Check the shape of a carried vote set against the validator set active at `target`, returning
/// the voting power it accumulates.
fn check_vote_set<V: ValidatorManager>(
    validator_manager: &V,
    target: &CryptoHash,
    votes: &VoteSet,
) -> Result<TotalPower, BlockValidationError> {
    use BlockValidationError::*;

    let validator_set = validator_manager.validator_set(target);
    let mut seen = std::collections::HashSet::new();
    let mut power = TotalPower::new(0);

    for vote in votes.iter() {
        if &vote.block != target {
            return Err(VoteForWrongBlock);
        }
        if !seen.insert(vote.id) {
            return Err(DuplicateVoter);
        }
        if !validator_set.contains(&vote.id) {
            return Err(VoterNotInValidatorSet);
        }
        if !vote.is_correct() {
            return Err(InvalidVoteSignature);
        }
        power += *validator_set.power(&vote.id).unwrap();
    }

    Ok(power)
}
