use serde::{Deserialize, Serialize};

use crate::principal::Role;
use crate::types::{PrincipalId, SessionToken, TimestampMs};

/// A single-use invite link. Activation is a conditional write keyed on
/// `used_by IS NULL` (see `custodia-repo`), so concurrent activation
/// attempts on the same token cannot both succeed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InviteToken {
    pub token: SessionToken,
    pub role: Role,
    pub created_by: PrincipalId,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
    pub used_by: Option<PrincipalId>,
    pub used_at: Option<TimestampMs>,
}

impl InviteToken {
    pub fn new(
        token: SessionToken,
        role: Role,
        created_by: PrincipalId,
        now_ms: TimestampMs,
        ttl_ms: i64,
    ) -> Self {
        Self {
            token,
            role,
            created_by,
            created_at: now_ms,
            expires_at: now_ms + ttl_ms,
            used_by: None,
            used_at: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_by.is_some()
    }

    pub fn is_expired(&self, now_ms: TimestampMs) -> bool {
        now_ms > self.expires_at
    }

    /// `(usedBy IS NULL) ∧ (now ≤ expiresAt)` — the precondition spec.md
    /// §3 requires for activation.
    pub fn is_activatable(&self, now_ms: TimestampMs) -> bool {
        !self.is_used() && !self.is_expired(now_ms)
    }
}
