//! AEAD custody of long-lived signing material (spec.md §4.1).
//!
//! ChaCha20Poly1305: 256-bit key, 96-bit random per-message nonce, 128-bit
//! tag. Wire format is `nonce ‖ ciphertext ‖ tag`, url-safe base64 encoded.

use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use custodia_core::constants::{AEAD_KEY_BYTES, AEAD_NONCE_BYTES, AEAD_TAG_BYTES};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

const B64: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::URL_SAFE_NO_PAD;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master key handle not initialized")]
    NotInitialized,

    #[error("master key must decode to exactly {AEAD_KEY_BYTES} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("malformed ciphertext blob")]
    MalformedBlob,

    #[error("decryption failed: tag mismatch or corrupted ciphertext")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// Owns the 256-bit master key for the process lifetime. Constructed once
/// from `MASTER_ENCRYPTION_KEY`; never exposes the raw key bytes again —
/// there is deliberately no `as_bytes`/`export` method on this type.
pub struct MasterKeyHandle {
    key: [u8; AEAD_KEY_BYTES],
}

impl MasterKeyHandle {
    /// Import from a base64-encoded 32-byte key. The caller's source buffer
    /// (typically the raw env var bytes) is zeroized by the caller after
    /// this returns; this function zeroizes its own decoding buffer.
    pub fn init(base64_key: &str) -> Result<Self, CryptoError> {
        let mut decoded = base64::engine::general_purpose::STANDARD
            .decode(base64_key.trim())
            .or_else(|_| B64.decode(base64_key.trim()))
            .map_err(|_| CryptoError::InvalidKeyLength(0))?;

        if decoded.len() != AEAD_KEY_BYTES {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyLength(len));
        }

        let mut key = [0u8; AEAD_KEY_BYTES];
        key.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { key })
    }

    /// Encrypt `plaintext` with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; AEAD_NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(AEAD_NONCE_BYTES + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(B64.encode(blob))
    }

    /// Decrypt a blob produced by [`Self::encrypt`]. The returned plaintext
    /// is caller-owned; callers must zeroize it after use (e.g. after
    /// importing it into a `Signer`).
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = B64.decode(blob).map_err(|_| CryptoError::MalformedBlob)?;
        if raw.len() < AEAD_NONCE_BYTES + AEAD_TAG_BYTES {
            return Err(CryptoError::MalformedBlob);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(AEAD_NONCE_BYTES);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Structural check used only by one-shot migration: does `value` parse
    /// as url-safe base64 of at least nonce+min_payload+tag bytes? Does not
    /// attempt to decrypt.
    pub fn is_encrypted(value: &str, min_payload_len: usize) -> bool {
        match B64.decode(value).or_else(|_| base64::engine::general_purpose::STANDARD.decode(value)) {
            Ok(bytes) => bytes.len() >= AEAD_NONCE_BYTES + min_payload_len + AEAD_TAG_BYTES,
            Err(_) => false,
        }
    }
}

impl Drop for MasterKeyHandle {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle() -> MasterKeyHandle {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let b64 = B64.encode(key);
        MasterKeyHandle::init(&b64).unwrap()
    }

    #[test]
    fn roundtrip_p1() {
        let handle = test_handle();
        let plaintext = b"pk:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let blob = handle.encrypt(plaintext).unwrap();
        let decrypted = handle.decrypt(&blob).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tamper_fails_p1() {
        let handle = test_handle();
        let blob = handle.encrypt(b"super secret seed bytes").unwrap();
        let mut raw = B64.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = B64.encode(raw);
        assert!(handle.decrypt(&tampered).is_err());
    }

    #[test]
    fn truncation_fails_p1() {
        let handle = test_handle();
        let blob = handle.encrypt(b"some plaintext").unwrap();
        let mut raw = B64.decode(&blob).unwrap();
        raw.pop();
        let truncated = B64.encode(raw);
        assert!(handle.decrypt(&truncated).is_err());
    }

    #[test]
    fn wrong_key_length_rejected() {
        let short = B64.encode([0u8; 16]);
        assert!(matches!(
            MasterKeyHandle::init(&short),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn is_encrypted_structural_check() {
        let handle = test_handle();
        let blob = handle.encrypt(b"0123456789012345678901234567890123456789").unwrap();
        assert!(MasterKeyHandle::is_encrypted(&blob, 40));
        assert!(!MasterKeyHandle::is_encrypted("not base64 at all !!", 40));
        assert!(!MasterKeyHandle::is_encrypted(&B64.encode([0u8; 4]), 40));
    }
}
