/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a blockchain.
///
/// Every block in the same chain tree shares the same `ChainID`, which in turn should be unique
/// between different chain trees. All nodes that replicate the same chain must be configured to use
/// the same `ChainID`.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Height of a block in the chain tree.
///
/// Starts at 0 for the genesis block and increases by exactly 1 along every parent-to-child link.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    /// Create a new `BlockHeight` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BlockHeight`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;
    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.add(rhs))
    }
}

impl Sub<BlockHeight> for BlockHeight {
    type Output = u64;
    fn sub(self, rhs: BlockHeight) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Protocol round counter. Increments on every round of proposal, and is decoupled from
/// [`BlockHeight`] so that a round may fail to produce a block.
///
/// Epochs increase strictly along every parent-to-child path in the chain tree, but unlike heights
/// they may skip values.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Epoch(u64);

impl Epoch {
    /// Create a new `Epoch` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the initial `Epoch`, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u64` of this `Epoch`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Check whether this `Epoch` is 0.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for Epoch {
    type Output = Epoch;
    fn add(self, rhs: u64) -> Self::Output {
        Epoch(self.0.add(rhs))
    }
}

/// 32-byte cryptographic hash.
///
/// Within this crate, `CryptoHash`-es are always SHA256 hashes over the Borsh encoding of a
/// [block][crate::types::block::Block]'s signed payload.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the all-zeroes `CryptoHash`, used as the parent reference of genesis blocks.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Check whether this hash is the all-zeroes hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Address of a validator: the bytes of its Ed25519 verifying key.
///
/// Unlike [`ed25519_dalek::VerifyingKey`], an address is not guaranteed to contain a valid curve
/// point, so recovering a verifying key from an address
/// [is fallible](crate::types::crypto_primitives::verifying_key_from_address).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct ValidatorAddress([u8; 32]);

impl ValidatorAddress {
    /// Create a new `ValidatorAddress` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the all-zeroes address. Blocks carrying it fail validation.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Check whether this address is the all-zeroes address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the inner `[u8; 32]` value of this `ValidatorAddress`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for ValidatorAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Block production time as seconds since the Unix epoch.
///
/// Timestamps are not required to be monotonic along a chain, but must be non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new `Timestamp` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Timestamp`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Check whether this `Timestamp` is 0.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Ed25519 digital signature.
///
/// Within this crate, these are produced using the [`ed25519_dalek`] crate, whose main definitions
/// are re-exported from the [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the all-zeroes signature, carried by genesis blocks, which are never validated.
    pub const fn zero() -> Self {
        Self([0u8; 64])
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

/// Weight of a specific validator's votes in consensus decisions.
///
/// The higher the power, the more weight the validator's votes have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of all validators in a
/// [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// The inner type that this newtype wraps around is `u128`, which is bigger than the inner `u64`
/// that `Power` wraps around. This is so that summing up large `Power`s does not cause
/// `TotalPower`'s inner value to overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

/// List of children of a particular block.
///
/// The "children" of a `block` is the set of blocks whose `parent` field names `block`'s hash.
/// Instances of this type are maintained by the [chain store](crate::chain::Chain), updated on
/// every insert.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize, Default)]
pub struct ChildrenList(Vec<CryptoHash>);

impl ChildrenList {
    /// Create a new `ChildrenList` wrapping around `blocks`.
    pub(crate) fn new(blocks: Vec<CryptoHash>) -> Self {
        Self(blocks)
    }

    /// Get a reference to the inner `Vec<CryptoHash>` value of this `ChildrenList`.
    pub const fn vec(&self) -> &Vec<CryptoHash> {
        &self.0
    }

    /// Iterate through the hashes of the blocks in this `ChildrenList`.
    pub fn iter(&self) -> std::slice::Iter<'_, CryptoHash> {
        self.0.iter()
    }

    /// Add `hash` to this `ChildrenList` if it is not already present.
    pub(crate) fn push(&mut self, hash: CryptoHash) {
        if !self.0.contains(&hash) {
            self.0.push(hash)
        }
    }
}
