/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.

use super::data_types::{SignatureBytes, ValidatorAddress};

// re-exports below.
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A wrapper around [`SigningKey`](ed25519_dalek::SigningKey) that implements a
/// [convenience method](Self::sign) for creating signatures as well as getters for the public key
/// and the [address](ValidatorAddress) derived from it.
#[derive(Clone)]
pub struct Keypair(pub(crate) SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Convenience method for creating signatures over values or messages represented as slices of
    /// bytes.
    pub(crate) fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub(crate) fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// The address under which this keypair votes and proposes.
    pub fn address(&self) -> ValidatorAddress {
        ValidatorAddress::new(self.public().to_bytes())
    }
}

/// Recover the Ed25519 verifying key behind `address`.
///
/// Fails if the address bytes do not encode a valid curve point, which is in particular the case
/// for the all-zeroes address.
pub fn verifying_key_from_address(
    address: &ValidatorAddress,
) -> Result<VerifyingKey, SignatureError> {
    VerifyingKey::from_bytes(&address.bytes())
}

/// Verify that `signature` is a signature created by the key behind `address` over `message`.
pub(crate) fn verify_signature(
    address: &ValidatorAddress,
    message: &[u8],
    signature: &SignatureBytes,
) -> bool {
    match verifying_key_from_address(address) {
        Ok(verifying_key) => {
            let signature = Signature::from_bytes(&signature.bytes());
            verifying_key.verify(message, &signature).is_ok()
        }
        Err(_) => false,
    }
}
