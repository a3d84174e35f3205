//! Owner-attributed operation lock with TTL (spec.md §4.8, P6).

use dashmap::DashMap;

use custodia_core::types::TimestampMs;

#[derive(Clone, Debug)]
struct LockEntry {
    owner_id: String,
    expires_at_ms: TimestampMs,
}

/// A string-keyed mutex where only the current owner may release it, and
/// stale (expired) entries are reclaimable by anyone.
pub struct OperationLock {
    entries: DashMap<String, LockEntry>,
}

impl OperationLock {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Succeeds iff the key is absent, or its prior holder's lease has
    /// expired (`expires_at_ms <= now`).
    pub fn acquire(&self, key: &str, owner_id: &str, ttl_ms: i64, now_ms: TimestampMs) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(LockEntry {
                    owner_id: owner_id.to_string(),
                    expires_at_ms: now_ms + ttl_ms,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                if slot.get().expires_at_ms <= now_ms {
                    slot.insert(LockEntry {
                        owner_id: owner_id.to_string(),
                        expires_at_ms: now_ms + ttl_ms,
                    });
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Releases only if `owner_id` currently holds the lock (P6). An
    /// expired lock is treated as already-released: any caller's release
    /// attempt on it returns `false` since there is nothing left to own.
    pub fn release(&self, key: &str, owner_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(slot) if slot.get().owner_id == owner_id => {
                slot.remove();
                true
            }
            _ => false,
        }
    }

    pub fn is_held(&self, key: &str, now_ms: TimestampMs) -> bool {
        self.entries
            .get(key)
            .map(|e| e.expires_at_ms > now_ms)
            .unwrap_or(false)
    }

    /// Periodic sweep of stale (expired) entries.
    pub fn reap(&self, now_ms: TimestampMs) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at_ms > now_ms);
        before - self.entries.len()
    }
}

impl Default for OperationLock {
    fn default() -> Self {
        Self::new()
    }
}
