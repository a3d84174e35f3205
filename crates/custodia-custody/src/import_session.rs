//! Two-stage wallet import handoff (spec.md §4.2): the import-token
//! produced by `store` is consumed by a GET that mints a form-token, which
//! is in turn consumed by the POST carrying the actual key material. The
//! split prevents an observer of the first URL from racing the legitimate
//! form submission.

use dashmap::DashMap;

use custodia_core::constants::{FORM_TOKEN_TTL_MS, IMPORT_TOKEN_TTL_MS};
use custodia_core::custody::{FormSession, ImportSession as ImportSessionEntry};
use custodia_core::error::CustodiaError;
use custodia_core::types::{PrincipalId, SessionToken, TimestampMs};
use custodia_crypto::generate_session_token;

pub struct ImportSessionStore {
    import_tokens: DashMap<String, ImportSessionEntry>,
    form_tokens: DashMap<String, FormSession>,
}

impl ImportSessionStore {
    pub fn new() -> Self {
        Self {
            import_tokens: DashMap::new(),
            form_tokens: DashMap::new(),
        }
    }

    /// Stage 1: mint an import-token bound to `principal_id`. Returns the
    /// public path (`/import/{token}`).
    pub fn store(&self, principal_id: PrincipalId, now_ms: TimestampMs) -> String {
        let token = generate_session_token();
        self.import_tokens.insert(
            token.as_str().to_string(),
            ImportSessionEntry {
                principal_id,
                created_at: now_ms,
                expires_at: now_ms + IMPORT_TOKEN_TTL_MS,
            },
        );
        format!("/import/{token}")
    }

    /// Stage 1 → 2: the GET that renders the import form consumes the
    /// import-token (atomic get-and-delete, expired entries evicted) and
    /// mints a CSRF/form-token in exchange.
    pub fn consume_import_token(
        &self,
        token: &str,
        now_ms: TimestampMs,
    ) -> Result<Option<SessionToken>, CustodiaError> {
        if !SessionToken::is_well_formed(token) {
            return Err(CustodiaError::InvalidTokenFormat);
        }
        let Some((_, entry)) = self.import_tokens.remove(token) else {
            return Ok(None);
        };
        if now_ms > entry.expires_at {
            return Ok(None);
        }
        let form_token = generate_session_token();
        self.form_tokens.insert(
            form_token.as_str().to_string(),
            FormSession {
                principal_id: entry.principal_id,
                created_at: now_ms,
                expires_at: now_ms + FORM_TOKEN_TTL_MS,
            },
        );
        Ok(Some(form_token))
    }

    /// Stage 2: the POST carrying the key material consumes the
    /// form-token. Returns the principal the submitted key belongs to.
    pub fn consume_form_token(
        &self,
        token: &str,
        now_ms: TimestampMs,
    ) -> Result<Option<PrincipalId>, CustodiaError> {
        if !SessionToken::is_well_formed(token) {
            return Err(CustodiaError::InvalidTokenFormat);
        }
        let Some((_, entry)) = self.form_tokens.remove(token) else {
            return Ok(None);
        };
        if now_ms > entry.expires_at {
            return Ok(None);
        }
        Ok(Some(entry.principal_id))
    }

    pub fn reap(&self, now_ms: TimestampMs) -> usize {
        let before = self.import_tokens.len() + self.form_tokens.len();
        self.import_tokens.retain(|_, e| e.expires_at > now_ms);
        self.form_tokens.retain(|_, e| e.expires_at > now_ms);
        before - (self.import_tokens.len() + self.form_tokens.len())
    }
}

impl Default for ImportSessionStore {
    fn default() -> Self {
        Self::new()
    }
}
