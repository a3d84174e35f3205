//! One-time secret handoff (spec.md §4.2, P3): a TTL-bounded map from a
//! 128-bit token to an AEAD-encrypted payload, readable exactly once.

use dashmap::DashMap;

use custodia_core::constants::SECRET_URL_TTL_MS;
use custodia_core::custody::SecretEntry;
use custodia_core::error::CustodiaError;
use custodia_core::types::{PrincipalId, SessionToken, TimestampMs};
use custodia_crypto::{generate_session_token, MasterKeyHandle};

/// Headers any adapter serving `PUBLIC_URL/secret/{token}` must set. HTTP
/// serving itself is out of scope (spec.md §1); these constants are the
/// contract a server framing layer is expected to honor.
pub const SECRET_URL_RESPONSE_HEADERS: &[(&str, &str)] = &[
    ("Cache-Control", "no-store"),
    ("X-Robots-Tag", "noindex"),
    (
        "Content-Security-Policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

pub struct SecretStore {
    entries: DashMap<String, SecretEntry>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Encrypt `plaintext` under `master_key` and store it behind a fresh
    /// token. Returns the public URL path (`/secret/{token}`) — the caller
    /// joins it with `PUBLIC_URL`.
    pub fn store(
        &self,
        master_key: &MasterKeyHandle,
        plaintext: &[u8],
        principal_id: PrincipalId,
        now_ms: TimestampMs,
    ) -> Result<String, CustodiaError> {
        let encrypted_payload = master_key
            .encrypt(plaintext)
            .map_err(|e| CustodiaError::Crypto(e.to_string()))?;
        let token = generate_session_token();
        self.entries.insert(
            token.as_str().to_string(),
            SecretEntry {
                encrypted_payload,
                principal_id,
                created_at: now_ms,
                expires_at: now_ms + SECRET_URL_TTL_MS,
            },
        );
        Ok(format!("/secret/{token}"))
    }

    /// Atomic get-and-delete: a second concurrent caller sees `None` (P3).
    /// Expired entries are deleted on access and also yield `None` (P4).
    pub fn consume(
        &self,
        master_key: &MasterKeyHandle,
        token: &str,
        now_ms: TimestampMs,
    ) -> Result<Option<Vec<u8>>, CustodiaError> {
        if !SessionToken::is_well_formed(token) {
            return Err(CustodiaError::InvalidTokenFormat);
        }
        let Some((_, entry)) = self.entries.remove(token) else {
            return Ok(None);
        };
        if now_ms > entry.expires_at {
            return Ok(None);
        }
        let plaintext = master_key
            .decrypt(&entry.encrypted_payload)
            .map_err(|e| CustodiaError::Crypto(e.to_string()))?;
        Ok(Some(plaintext))
    }

    /// Sweep expired entries without an explicit consume — run by the
    /// shared reaper task.
    pub fn reap(&self, now_ms: TimestampMs) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now_ms);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn test_key() -> MasterKeyHandle {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        MasterKeyHandle::init(&base64::engine::general_purpose::STANDARD.encode(key)).unwrap()
    }

    #[test]
    fn p3_one_shot_consume() {
        let store = SecretStore::new();
        let key = test_key();
        let url = store
            .store(&key, b"pk:seedbytes", PrincipalId::new("1"), 0)
            .unwrap();
        assert!(url.starts_with("/secret/"));
        let token = url.trim_start_matches("/secret/");

        let first = store.consume(&key, token, 10).unwrap();
        assert_eq!(first, Some(b"pk:seedbytes".to_vec()));

        let second = store.consume(&key, token, 10).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn p4_expired_entry_returns_none_and_evicts() {
        let store = SecretStore::new();
        let key = test_key();
        let url = store
            .store(&key, b"payload", PrincipalId::new("1"), 0)
            .unwrap();
        let token = url.trim_start_matches("/secret/");

        let far_future = 0 + custodia_core::constants::SECRET_URL_TTL_MS + 1;
        let result = store.consume(&key, token, far_future).unwrap();
        assert!(result.is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn rejects_malformed_token() {
        let store = SecretStore::new();
        let key = test_key();
        assert!(matches!(
            store.consume(&key, "not-a-valid-token!!", 0),
            Err(CustodiaError::InvalidTokenFormat)
        ));
    }
}
