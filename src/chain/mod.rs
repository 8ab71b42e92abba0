/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chain store: an append-only, in-memory tree of blocks rooted at a genesis block.
//!
//! # Ownership and concurrency
//!
//! The [`Chain`] exclusively owns the blocks inserted into it. Components hold on to blocks by
//! hash and re-resolve them through [`find_block`](Chain::find_block) on each access; what they
//! get back is an [`ExtendedBlock`], a cheaply clonable handle to the stored block plus its status
//! flags.
//!
//! Insertions and children-list updates are serialized behind an internal lock (single-writer
//! discipline). The two status flags live in an atomic flag word per block, so flag reads never
//! take the lock: a reader that observes a flag as set is guaranteed (release/acquire ordering) to
//! observe it as set on every subsequent read.
//!
//! # Flag monotonicity
//!
//! [`mark_block_valid`](Chain::mark_block_valid) and
//! [`mark_block_has_validator_update`](Chain::mark_block_has_validator_update) are idempotent, and
//! flags are never cleared once set. Blocks are never removed; pruning is out of scope.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, RwLock,
    },
};

use crate::types::{
    block::Block,
    data_types::{BlockHeight, ChainID, ChildrenList, CryptoHash, Epoch},
};

const FLAG_VALID: u8 = 0b01;
const FLAG_HAS_VALIDATOR_UPDATE: u8 = 0b10;

/// A block kept in the [`Chain`], augmented with its hash, children, and two monotonic status
/// flags:
/// - [`valid`](Self::valid): the engine has verified the block in isolation.
/// - [`has_validator_update`](Self::has_validator_update): applying the block changes the active
///   validator set.
#[derive(Clone)]
pub struct ExtendedBlock {
    inner: Arc<StoredBlock>,
}

struct StoredBlock {
    block: Block,
    hash: CryptoHash,
    flags: AtomicU8,
}

impl ExtendedBlock {
    fn new(block: Block, flags: u8) -> Self {
        let hash = block.hash();
        Self {
            inner: Arc::new(StoredBlock {
                block,
                hash,
                flags: AtomicU8::new(flags),
            }),
        }
    }

    /// The wrapped block.
    pub fn block(&self) -> &Block {
        &self.inner.block
    }

    /// The block's hash, computed once at insertion.
    pub fn hash(&self) -> CryptoHash {
        self.inner.hash
    }

    pub fn height(&self) -> BlockHeight {
        self.inner.block.height
    }

    pub fn epoch(&self) -> Epoch {
        self.inner.block.epoch
    }

    /// Hash of this block's parent.
    pub fn parent(&self) -> CryptoHash {
        self.inner.block.parent
    }

    /// Whether the engine has verified this block in isolation.
    pub fn valid(&self) -> bool {
        self.inner.flags.load(Ordering::Acquire) & FLAG_VALID != 0
    }

    /// Whether applying this block changes the active validator set.
    pub fn has_validator_update(&self) -> bool {
        self.inner.flags.load(Ordering::Acquire) & FLAG_HAS_VALIDATOR_UPDATE != 0
    }

    fn set_flag(&self, flag: u8) {
        self.inner.flags.fetch_or(flag, Ordering::AcqRel);
    }
}

/// The ways a call to a method of the [`Chain`] can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum ChainError {
    /// The block being inserted is already in the store.
    BlockKnown { block: CryptoHash },

    /// The block being inserted carries a foreign chain ID.
    WrongChainID,

    /// A block expected to be in the store was not found.
    BlockExpectedButNotFound { block: CryptoHash },
}

/// An in-memory, append-only tree of blocks.
///
/// Orphans are tolerated: a block may be inserted before its parent is known. The children index
/// is keyed by parent hash, so once the parent arrives its children can be
/// [looked up](Chain::children) and re-examined.
pub struct Chain {
    chain_id: ChainID,
    root: CryptoHash,
    inner: RwLock<ChainInner>,
}

struct ChainInner {
    blocks: HashMap<CryptoHash, ExtendedBlock>,
    children: HashMap<CryptoHash, ChildrenList>,
}

impl Chain {
    /// Create a chain rooted at `root`. The root is marked valid on creation; it is the one block
    /// that is trusted without validation.
    pub fn new(chain_id: ChainID, root: Block) -> Chain {
        let root_block = ExtendedBlock::new(root, FLAG_VALID);
        let root_hash = root_block.hash();

        let mut blocks = HashMap::new();
        blocks.insert(root_hash, root_block);

        Chain {
            chain_id,
            root: root_hash,
            inner: RwLock::new(ChainInner {
                blocks,
                children: HashMap::new(),
            }),
        }
    }

    /// The ID of the chain this store tracks.
    pub fn chain_id(&self) -> ChainID {
        self.chain_id
    }

    /// Insert `block` into the tree, tolerating a missing parent, and record it as a child of its
    /// parent. Fails if a block with the same hash is already stored, or if the block names a
    /// foreign chain.
    pub fn add_block(&self, block: Block) -> Result<ExtendedBlock, ChainError> {
        if block.chain_id != self.chain_id {
            return Err(ChainError::WrongChainID);
        }

        let extended = ExtendedBlock::new(block, 0);
        let hash = extended.hash();
        let parent = extended.parent();

        let mut inner = self.inner.write().unwrap();
        if inner.blocks.contains_key(&hash) {
            return Err(ChainError::BlockKnown { block: hash });
        }
        inner.blocks.insert(hash, extended.clone());
        inner
            .children
            .entry(parent)
            .or_insert_with(|| ChildrenList::new(Vec::new()))
            .push(hash);

        Ok(extended)
    }

    /// Get the block identified by `hash`, if it is in the store.
    pub fn find_block(&self, hash: &CryptoHash) -> Option<ExtendedBlock> {
        self.inner.read().unwrap().blocks.get(hash).cloned()
    }

    /// Check whether the store holds a block identified by `hash`.
    pub fn contains(&self, hash: &CryptoHash) -> bool {
        self.inner.read().unwrap().blocks.contains_key(hash)
    }

    /// The genesis block this tree is rooted at.
    pub fn root(&self) -> ExtendedBlock {
        self.find_block(&self.root)
            .expect("the root block is inserted at construction and never removed")
    }

    /// Hashes of the known children of the block identified by `hash`.
    pub fn children(&self, hash: &CryptoHash) -> ChildrenList {
        self.inner
            .read()
            .unwrap()
            .children
            .get(hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Set the `valid` flag on the block identified by `hash`. Idempotent.
    pub fn mark_block_valid(&self, hash: &CryptoHash) -> Result<ExtendedBlock, ChainError> {
        let block = self
            .find_block(hash)
            .ok_or(ChainError::BlockExpectedButNotFound { block: *hash })?;
        block.set_flag(FLAG_VALID);
        Ok(block)
    }

    /// Set the `has_validator_update` flag on the block identified by `hash`. Idempotent.
    pub fn mark_block_has_validator_update(
        &self,
        hash: &CryptoHash,
    ) -> Result<ExtendedBlock, ChainError> {
        let block = self
            .find_block(hash)
            .ok_or(ChainError::BlockExpectedButNotFound { block: *hash })?;
        block.set_flag(FLAG_HAS_VALIDATOR_UPDATE);
        Ok(block)
    }

    /// Check whether the block identified by `ancestor` is an ancestor of `descendant`
    /// (inclusive: every block is an ancestor of itself).
    ///
    /// Walks parent links from `descendant` toward the root; the walk also stops at a block whose
    /// parent is not in the store, so the answer for an orphaned branch is `false` rather than an
    /// error.
    pub fn is_ancestor(&self, ancestor: &CryptoHash, descendant: &CryptoHash) -> bool {
        let mut current = *descendant;
        loop {
            if &current == ancestor {
                return true;
            }
            if current == self.root {
                return false;
            }
            match self.find_block(&current) {
                Some(block) => current = block.parent(),
                None => return false,
            }
        }
    }

    /// Hashes of every stored block whose height lies in `[start, start + count)`, in ascending
    /// height order. Used to answer inventory requests.
    pub fn blocks_in_height_range(&self, start: BlockHeight, count: u64) -> Vec<CryptoHash> {
        let inner = self.inner.read().unwrap();
        let end = start + count;
        let mut found: Vec<(BlockHeight, CryptoHash)> = inner
            .blocks
            .values()
            .filter(|b| b.height() >= start && b.height() < end)
            .map(|b| (b.height(), b.hash()))
            .collect();
        found.sort();
        found.into_iter().map(|(_, hash)| hash).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        block::CommitCertificate,
        data_types::{SignatureBytes, Timestamp, ValidatorAddress},
    };

    fn chain_with_root() -> (Chain, CryptoHash) {
        let root = Block {
            chain_id: ChainID::new(1),
            height: BlockHeight::new(0),
            epoch: Epoch::init(),
            parent: CryptoHash::zero(),
            hcc: CommitCertificate::new(CryptoHash::zero()),
            proposer: ValidatorAddress::zero(),
            timestamp: Timestamp::new(1),
            signature: SignatureBytes::zero(),
        };
        let root_hash = root.hash();
        (Chain::new(ChainID::new(1), root), root_hash)
    }

    fn child_of(chain_id: ChainID, parent: CryptoHash, height: u64, epoch: u64) -> Block {
        Block {
            chain_id,
            height: BlockHeight::new(height),
            epoch: Epoch::new(epoch),
            parent,
            hcc: CommitCertificate::new(parent),
            proposer: ValidatorAddress::new([7; 32]),
            timestamp: Timestamp::new(epoch),
            signature: SignatureBytes::zero(),
        }
    }

    #[test]
    fn root_is_valid_from_the_start() {
        let (chain, root_hash) = chain_with_root();
        assert!(chain.root().valid());
        assert_eq!(chain.root().hash(), root_hash);
    }

    #[test]
    fn insert_records_children_and_rejects_duplicates() {
        let (chain, root_hash) = chain_with_root();
        let b1 = child_of(chain.chain_id(), root_hash, 1, 1);
        let b1_hash = b1.hash();

        chain.add_block(b1.clone()).unwrap();
        assert!(matches!(
            chain.add_block(b1),
            Err(ChainError::BlockKnown { block }) if block == b1_hash
        ));
        assert_eq!(chain.children(&root_hash).vec(), &vec![b1_hash]);
    }

    #[test]
    fn orphans_are_stored_and_linked_to_their_absent_parent() {
        let (chain, _) = chain_with_root();
        let missing_parent = CryptoHash::new([9; 32]);
        let orphan = child_of(chain.chain_id(), missing_parent, 5, 5);
        let orphan_hash = orphan.hash();

        chain.add_block(orphan).unwrap();
        assert!(chain.contains(&orphan_hash));
        assert_eq!(chain.children(&missing_parent).vec(), &vec![orphan_hash]);
        // An orphaned branch is not an ancestor of anything reachable.
        assert!(!chain.is_ancestor(&chain.root().hash(), &orphan_hash));
    }

    #[test]
    fn flags_are_monotonic_and_idempotent() {
        let (chain, root_hash) = chain_with_root();
        let b1 = chain
            .add_block(child_of(chain.chain_id(), root_hash, 1, 1))
            .unwrap();
        assert!(!b1.valid());
        assert!(!b1.has_validator_update());

        chain.mark_block_valid(&b1.hash()).unwrap();
        chain.mark_block_valid(&b1.hash()).unwrap();
        chain.mark_block_has_validator_update(&b1.hash()).unwrap();

        // Handles resolved before the update observe the flags too.
        assert!(b1.valid());
        assert!(b1.has_validator_update());
    }

    #[test]
    fn ancestry_is_inclusive_and_follows_parent_links() {
        let (chain, root_hash) = chain_with_root();
        let b1 = chain
            .add_block(child_of(chain.chain_id(), root_hash, 1, 1))
            .unwrap();
        let b2 = chain
            .add_block(child_of(chain.chain_id(), b1.hash(), 2, 2))
            .unwrap();

        assert!(chain.is_ancestor(&b2.hash(), &b2.hash()));
        assert!(chain.is_ancestor(&root_hash, &b2.hash()));
        assert!(!chain.is_ancestor(&b2.hash(), &b1.hash()));
    }
}
