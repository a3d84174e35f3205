//! Token/id hashing and generation helpers.

use base64::Engine;
use custodia_core::constants::TOKEN_RANDOM_BYTES;
use custodia_core::types::SessionToken;
use rand::RngCore;

const B64: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// A fresh 128-bit random token rendered as 22-character URL-safe base64 —
/// the shared format for secret URLs, import/form/confirmation sessions,
/// and invite links (spec.md §4.2/§4.6).
pub fn generate_session_token() -> SessionToken {
    let mut bytes = [0u8; TOKEN_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = B64.encode(bytes);
    debug_assert!(SessionToken::is_well_formed(&token));
    SessionToken(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_matches_well_formed_regex() {
        for _ in 0..100 {
            let token = generate_session_token();
            assert!(SessionToken::is_well_formed(token.as_str()));
        }
    }

    #[test]
    fn tokens_are_not_repeated() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
    }
}
