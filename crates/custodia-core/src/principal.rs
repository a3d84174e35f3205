//! Principal and role data structures.
//!
//! A [`Principal`] is anyone the assistant has generated or imported a
//! custodial key for. An [`AuthorizedPrincipal`] is the separate, smaller
//! record of who is allowed to use the assistant at all, and at what role —
//! a principal can exist without being authorized, and an authorized
//! principal does not require a key to already be provisioned.

use serde::{Deserialize, Serialize};

use crate::types::{Address, PrincipalId, TimestampMs};

fn default_true() -> bool {
    true
}

/// Role hierarchy: owner > admin > user. Higher roles can manage (add,
/// remove, change the role of) any principal at or below their own rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
    Owner,
}

impl Role {
    /// Whether a principal holding `self` may manage a principal holding
    /// `target` — strictly greater rank only; nobody manages their own rank.
    pub fn can_manage(&self, target: Role) -> bool {
        *self > target
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Owner => "owner",
        };
        write!(f, "{s}")
    }
}

/// The full custodial record for a user: key material status and trading
/// preferences. Plaintext key bytes never live here — `encrypted_secret` is
/// the AEAD blob produced by `custodia_crypto::MasterKeyHandle::encrypt`;
/// it is only ever decrypted transiently inside a signing scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub address: Option<Address>,

    /// AEAD-encrypted signing seed, url-safe base64 (`nonce ‖ ciphertext ‖
    /// tag`). `None` until a wallet has been generated or imported.
    #[serde(default)]
    pub encrypted_secret: Option<String>,

    pub created_at: TimestampMs,
    #[serde(default)]
    pub updated_at: TimestampMs,

    /// Per-principal default slippage tolerance in basis points, used by
    /// the confirmation pipeline when a swap request omits one.
    #[serde(default)]
    pub default_slippage_bps: Option<u32>,

    /// Whether DCA rebalancing is currently enabled for this principal.
    #[serde(default)]
    pub dca_enabled: bool,
}

impl Principal {
    pub fn new(id: PrincipalId, now_ms: TimestampMs) -> Self {
        Self {
            id,
            address: None,
            encrypted_secret: None,
            created_at: now_ms,
            updated_at: now_ms,
            default_slippage_bps: None,
            dca_enabled: false,
        }
    }

    pub fn has_wallet(&self) -> bool {
        self.address.is_some() && self.encrypted_secret.is_some()
    }

    /// Provision a freshly generated or imported wallet: bind the public
    /// address and the AEAD-encrypted seed in one update.
    pub fn provision_wallet(&mut self, address: Address, encrypted_secret: String, now_ms: TimestampMs) {
        self.address = Some(address);
        self.encrypted_secret = Some(encrypted_secret);
        self.updated_at = now_ms;
    }
}

/// The authorization record: is this principal allowed to use the
/// assistant, and at what role. Kept separate from [`Principal`] so that
/// authorization state, role changes, and invite provenance can be audited
/// independently of custodial key lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizedPrincipal {
    pub id: PrincipalId,
    pub role: Role,
    pub authorized_at: TimestampMs,

    /// Who authorized this principal (owner id, or `None` for the
    /// bootstrap owner set from `OWNER_ID` at first boot).
    #[serde(default)]
    pub authorized_by: Option<PrincipalId>,

    /// Whether this record is currently active. Removal sets this to
    /// `false` rather than deleting the row, preserving the audit trail.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Last time this row was mutated (role change, removal, reactivation).
    #[serde(default)]
    pub updated_at: TimestampMs,
}

impl AuthorizedPrincipal {
    pub fn bootstrap_owner(id: PrincipalId, now_ms: TimestampMs) -> Self {
        Self {
            id,
            role: Role::Owner,
            authorized_at: now_ms,
            authorized_by: None,
            active: true,
            updated_at: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_hierarchy() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::User);
    }

    #[test]
    fn can_manage_is_strict() {
        assert!(Role::Owner.can_manage(Role::Admin));
        assert!(Role::Admin.can_manage(Role::User));
        assert!(!Role::Admin.can_manage(Role::Admin));
        assert!(!Role::User.can_manage(Role::Owner));
    }
}
