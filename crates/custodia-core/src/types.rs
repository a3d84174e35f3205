use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds — every scheduler/session/cache timestamp
/// in this crate is expressed in this unit, matching spec.md's `intervalMs`
/// and `lastRunAt` fields.
pub type TimestampMs = i64;

/// Smallest-unit ledger amount (lamports, or an SPL token's base units).
pub type Amount = u64;

/// Slippage / basis-point quantities, always out of 10_000.
pub type BasisPoints = u32;

// ── PrincipalId ────────────────────────────────────────────────────────────

/// Opaque identifier for an authorized user of the assistant. Distinct from
/// `Address`: a principal may exist (and be invited, assigned a role) before
/// any custodial key has been generated or imported for them.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId({})", self.0)
    }
}

// ── Address ──────────────────────────────────────────────────────────────

/// A base58-encoded ledger address (the public half of a `Signer`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn from_pubkey_bytes(bytes: &[u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.0;
        if s.len() > 8 {
            write!(f, "Address({}…)", &s[..8])
        } else {
            write!(f, "Address({s})")
        }
    }
}

// ── Mint ─────────────────────────────────────────────────────────────────

/// Identifies a tradable asset: either the native ledger asset or an
/// SPL-token mint address.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum Mint {
    Native,
    Spl(String),
}

impl fmt::Display for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mint::Native => write!(f, "native"),
            Mint::Spl(addr) => write!(f, "{addr}"),
        }
    }
}

// ── TxSignature ──────────────────────────────────────────────────────────

/// A base58-encoded Ed25519 ledger transaction signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxSignature({}…)", &self.0.get(..8).unwrap_or(&self.0))
    }
}

// ── SessionToken ─────────────────────────────────────────────────────────

/// A 22-character URL-safe base64 token, used for secret URLs, import
/// sessions, and invite links. `^[A-Za-z0-9_-]{22}$`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn is_well_formed(s: &str) -> bool {
        s.len() == 22
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({}…)", &self.0[..6.min(self.0.len())])
    }
}
