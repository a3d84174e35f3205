pub mod confirmation;
pub mod import_session;
pub mod secret_store;

pub use confirmation::{slippage_breached, ConfirmOutcome, ConfirmationCache};
pub use import_session::ImportSessionStore;
pub use secret_store::{SecretStore, SECRET_URL_RESPONSE_HEADERS};

use custodia_core::types::TimestampMs;

/// The three TTL-bounded handoff stores swept by the shared background
/// reaper (spec.md §4.2 "periodic reaper" supplement). Grouped here so the
/// composition root spawns one `tokio::time::interval` task instead of
/// three.
pub struct CustodyStores {
    pub secrets: SecretStore,
    pub imports: ImportSessionStore,
    pub confirmations: ConfirmationCache,
}

impl CustodyStores {
    pub fn new() -> Self {
        Self {
            secrets: SecretStore::new(),
            imports: ImportSessionStore::new(),
            confirmations: ConfirmationCache::new(),
        }
    }

    /// Sweep all three maps once; returns the total number of entries
    /// removed, logged at `debug` by the caller.
    pub fn reap_all(&self, now_ms: TimestampMs) -> usize {
        self.secrets.reap(now_ms) + self.imports.reap(now_ms) + self.confirmations.reap(now_ms)
    }
}

impl Default for CustodyStores {
    fn default() -> Self {
        Self::new()
    }
}
