//! In-memory custody-session DTOs (spec.md §3): `SecretEntry`,
//! `ImportSession`/`FormSession`, `ConfirmationSession`. None of these are
//! persisted — they live only inside the TTL-bounded maps of
//! `custodia-custody` for the duration of their lifetime, then vanish on
//! consume or reap.

use serde::{Deserialize, Serialize};

use crate::swap::SwapQuote;
use crate::types::{Amount, Mint, PrincipalId, TimestampMs};

/// A one-time AEAD-encrypted payload awaiting a single handoff read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretEntry {
    pub encrypted_payload: String,
    pub principal_id: PrincipalId,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
}

/// Stage 1 of a wallet import: created by `store`, consumed by the GET that
/// renders the import form. Consuming it mints a [`FormSession`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportSession {
    pub principal_id: PrincipalId,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
}

/// Stage 2 of a wallet import: the CSRF/form token exchanged for an
/// [`ImportSession`], consumed by the POST carrying the actual key material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormSession {
    pub principal_id: PrincipalId,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
}

/// What a confirmation session is confirming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationKind {
    PortfolioBuy,
    SwapExecute,
}

/// A pending trade awaiting the caller's confirmation, possibly after one
/// re-quote on slippage breach (spec.md §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmationSession {
    pub principal_id: PrincipalId,
    pub kind: ConfirmationKind,
    pub amount: Amount,
    pub asset: Mint,
    pub quote: SwapQuote,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
    pub reconfirm_count: u8,
}

impl ConfirmationSession {
    pub const MAX_RECONFIRMS: u8 = 1;

    pub fn is_expired(&self, now_ms: TimestampMs) -> bool {
        now_ms > self.expires_at
    }

    pub fn can_reconfirm(&self) -> bool {
        self.reconfirm_count < Self::MAX_RECONFIRMS
    }
}
