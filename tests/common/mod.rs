//! Helpers shared by the integration tests: keypairs, block builders, and validator managers.

#![allow(dead_code)]

use std::sync::Arc;

use chained_bft::{
    chain::{Chain, ExtendedBlock},
    types::{
        block::{Block, CommitCertificate},
        crypto_primitives::Keypair,
        data_types::{
            BlockHeight, ChainID, CryptoHash, Epoch, Power, SignatureBytes, Timestamp,
            ValidatorAddress,
        },
        validator_set::ValidatorSet,
    },
    validator_manager::{StaticValidatorManager, ValidatorManager},
};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

pub const TEST_CHAIN: ChainID = ChainID::new(42);

pub fn keypair() -> Keypair {
    Keypair::new(SigningKey::generate(&mut OsRng))
}

pub fn keypairs(n: usize) -> Vec<Keypair> {
    (0..n).map(|_| keypair()).collect()
}

/// A genesis block at height 0, epoch 0. Not signed; the chain store trusts its root without
/// validation.
pub fn genesis(chain_id: ChainID) -> Block {
    Block {
        chain_id,
        height: BlockHeight::new(0),
        epoch: Epoch::init(),
        parent: CryptoHash::zero(),
        hcc: CommitCertificate::new(CryptoHash::zero()),
        proposer: ValidatorAddress::zero(),
        timestamp: Timestamp::new(1),
        signature: SignatureBytes::zero(),
    }
}

/// A chain rooted at a fresh genesis block.
pub fn test_chain() -> Chain {
    Chain::new(TEST_CHAIN, genesis(TEST_CHAIN))
}

/// A validator manager over the given keypairs, every one with unit power.
pub fn manager_of(keypairs: &[Keypair]) -> Arc<StaticValidatorManager> {
    let mut set = ValidatorSet::new();
    for keypair in keypairs {
        set.put(&keypair.address(), Power::new(1));
    }
    Arc::new(StaticValidatorManager::new(set))
}

/// A correctly signed block extending `parent` in `epoch`, carrying `hcc`.
pub fn signed_block(
    keypair: &Keypair,
    parent: &ExtendedBlock,
    epoch: u64,
    hcc: CommitCertificate,
) -> Block {
    Block::new_signed(
        keypair,
        parent.block().chain_id,
        parent.height() + 1,
        Epoch::new(epoch),
        parent.hash(),
        hcc,
        Timestamp::new(1_700_000_000 + epoch),
    )
}

/// The keypair (among `keypairs`) that `manager` assigns as proposer of `(parent, epoch)`.
pub fn proposer_keypair<'a, V: ValidatorManager>(
    manager: &V,
    keypairs: &'a [Keypair],
    parent: &CryptoHash,
    epoch: u64,
) -> &'a Keypair {
    let assigned = manager.proposer(parent, Epoch::new(epoch)).address;
    keypairs
        .iter()
        .find(|kp| kp.address() == assigned)
        .expect("the assigned proposer is one of the test keypairs")
}
