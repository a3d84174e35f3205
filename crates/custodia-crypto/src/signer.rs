//! Ed25519 signer for custodial key material. Secret scalar material is
//! held zeroizing and wiped on `Drop`, matching the teacher's
//! `shared-crypto::signatures::Ed25519KeyPair` / `chronx-crypto::KeyPair`
//! custom-`Debug`-hides-secret convention.

use custodia_core::types::Address;
use ed25519_dalek::{Signer as _, SigningKey};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid seed length: expected 32 bytes, got {0}")]
    InvalidSeedLength(usize),
}

/// A live, in-memory signing key. Never (de)serialized; constructed
/// transiently for the duration of one signing scope (spec.md §4.4 step 2
/// production path) or once at process start for dev mode.
pub struct Signer {
    signing_key: Zeroizing<SigningKey>,
    address: Address,
}

impl Signer {
    /// Build a signer from a raw 32-byte seed. The caller's seed buffer
    /// must be zeroized by the caller immediately after this call returns.
    pub fn from_seed(seed: &[u8]) -> Result<Self, SignerError> {
        if seed.len() != 32 {
            return Err(SignerError::InvalidSeedLength(seed.len()));
        }
        let mut seed_arr = [0u8; 32];
        seed_arr.copy_from_slice(seed);
        let signing_key = SigningKey::from_bytes(&seed_arr);
        let address = Address::from_pubkey_bytes(&signing_key.verifying_key().to_bytes());
        Ok(Self {
            signing_key: Zeroizing::new(signing_key),
            address,
        })
    }

    /// Generate a fresh keypair (first-contact provisioning).
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let address = Address::from_pubkey_bytes(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key: Zeroizing::new(signing_key),
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Return the raw 32-byte seed for AEAD-encrypted storage. Caller must
    /// zeroize the returned buffer after encrypting it.
    pub fn to_seed_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signer {{ address: {:?} }}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_per_key() {
        let signer = Signer::generate();
        let msg = b"blueprint bytes";
        assert_eq!(signer.sign(msg), signer.sign(msg));
    }

    #[test]
    fn seed_roundtrip_preserves_address() {
        let original = Signer::generate();
        let seed = original.to_seed_bytes();
        let restored = Signer::from_seed(&*seed).unwrap();
        assert_eq!(original.address().as_str(), restored.address().as_str());
    }

    #[test]
    fn rejects_wrong_seed_length() {
        assert!(matches!(
            Signer::from_seed(&[0u8; 16]),
            Err(SignerError::InvalidSeedLength(16))
        ));
    }
}
