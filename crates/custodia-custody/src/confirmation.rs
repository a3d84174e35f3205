//! Confirmation pipeline (spec.md §4.3): `Pending` → {`Consumed`,
//! `Reconfirmed`, `Cancelled`, `Expired`}, with a once-only re-quote on
//! slippage breach (P11).

use dashmap::DashMap;
use rust_decimal::Decimal;

use custodia_core::constants::CONFIRMATION_TTL_MS;
use custodia_core::custody::{ConfirmationKind, ConfirmationSession};
use custodia_core::error::CustodiaError;
use custodia_core::swap::SwapQuote;
use custodia_core::types::{Amount, Mint, PrincipalId, SessionToken, TimestampMs};
use custodia_crypto::generate_session_token;

/// Outcome of presenting a fresh quote against a pending confirmation.
#[derive(Debug)]
pub enum ConfirmOutcome {
    /// Slippage within policy: the session was atomically consumed and the
    /// caller should proceed to build/sign/submit using `quote`.
    Proceed { quote: SwapQuote },
    /// Slippage breached and a reconfirmation attempt remains: the quote
    /// was replaced in place; caller should re-prompt the user.
    ReconfirmRequired { new_quote: SwapQuote },
    /// Slippage breached with no reconfirmation attempts left: the session
    /// was deleted.
    MaxSlippageExceeded,
}

pub struct ConfirmationCache {
    sessions: DashMap<String, ConfirmationSession>,
}

impl ConfirmationCache {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn store(
        &self,
        principal_id: PrincipalId,
        kind: ConfirmationKind,
        amount: Amount,
        asset: Mint,
        quote: SwapQuote,
        now_ms: TimestampMs,
    ) -> SessionToken {
        let token = generate_session_token();
        self.sessions.insert(
            token.as_str().to_string(),
            ConfirmationSession {
                principal_id,
                kind,
                amount,
                asset,
                quote,
                created_at: now_ms,
                expires_at: now_ms + CONFIRMATION_TTL_MS,
                reconfirm_count: 0,
            },
        );
        token
    }

    /// Returns the session iff it exists, is unexpired, and belongs to
    /// `principal_id` — cross-principal access is indistinguishable from
    /// not-found. Expired entries are deleted on access (P4).
    pub fn get(
        &self,
        token: &str,
        principal_id: &PrincipalId,
        now_ms: TimestampMs,
    ) -> Option<ConfirmationSession> {
        let entry = self.sessions.get(token)?;
        if entry.is_expired(now_ms) || &entry.principal_id != principal_id {
            drop(entry);
            if self
                .sessions
                .get(token)
                .map(|e| e.is_expired(now_ms))
                .unwrap_or(false)
            {
                self.sessions.remove(token);
            }
            return None;
        }
        Some(entry.clone())
    }

    /// Apply the Slippage Policy for a fresh quote against the session
    /// named by `token`, and transition accordingly. `fresh_quote` must
    /// quote the same `(inputAmount, asset)` as the original.
    pub fn confirm(
        &self,
        token: &str,
        principal_id: &PrincipalId,
        fresh_quote: SwapQuote,
        now_ms: TimestampMs,
    ) -> Result<ConfirmOutcome, CustodiaError> {
        let Some(mut entry) = self.sessions.get_mut(token) else {
            return Err(CustodiaError::SessionNotFound(token.to_string()));
        };
        if entry.is_expired(now_ms) || &entry.principal_id != principal_id {
            drop(entry);
            self.sessions.remove(token);
            return Err(CustodiaError::SessionNotFound(token.to_string()));
        }

        if !slippage_breached(&entry.quote, &fresh_quote, entry.quote.slippage_bps) {
            let quote = entry.quote.clone();
            drop(entry);
            self.sessions.remove(token);
            return Ok(ConfirmOutcome::Proceed { quote });
        }

        if entry.can_reconfirm() {
            entry.quote = fresh_quote.clone();
            entry.reconfirm_count += 1;
            entry.expires_at = now_ms + CONFIRMATION_TTL_MS;
            return Ok(ConfirmOutcome::ReconfirmRequired {
                new_quote: fresh_quote,
            });
        }

        drop(entry);
        self.sessions.remove(token);
        Ok(ConfirmOutcome::MaxSlippageExceeded)
    }

    pub fn cancel(&self, token: &str, principal_id: &PrincipalId) -> bool {
        if let Some(entry) = self.sessions.get(token) {
            if &entry.principal_id != principal_id {
                return false;
            }
        } else {
            return false;
        }
        self.sessions.remove(token).is_some()
    }

    pub fn reap(&self, now_ms: TimestampMs) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, e| !e.is_expired(now_ms));
        before - self.sessions.len()
    }
}

impl Default for ConfirmationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Precise slippage check (spec.md §4.3): `(Q0.out - Q1.out) / Q0.out >
/// slippageBps / 10_000`. Arbitrary-precision decimal arithmetic only —
/// never native floats, per spec and P11.
pub fn slippage_breached(original: &SwapQuote, fresh: &SwapQuote, slippage_bps: u32) -> bool {
    let original_out = Decimal::from(original.output_amount);
    let fresh_out = Decimal::from(fresh.output_amount);
    if original_out.is_zero() {
        return false;
    }
    let ratio = (original_out - fresh_out) / original_out;
    let threshold = Decimal::from(slippage_bps) / Decimal::from(10_000u32);
    ratio > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(output_amount: Amount, slippage_bps: u32) -> SwapQuote {
        SwapQuote {
            input_mint: Mint::Native,
            output_mint: Mint::Spl("USDC".into()),
            input_amount: 1_000_000,
            output_amount,
            price_impact_bps: 5,
            slippage_bps,
            route: serde_json::Value::Null,
        }
    }

    /// Seed scenario 2 (spec.md §8): Q0.out=100, Q1.out=98,
    /// slippageBps=100 → reconfirm once; Q2.out=95 → max-slippage-exceeded.
    #[test]
    fn seed_scenario_slippage_breach_then_abort() {
        let cache = ConfirmationCache::new();
        let principal = PrincipalId::new("1");
        let q0 = quote(100, 100);
        let token = cache.store(
            principal.clone(),
            ConfirmationKind::SwapExecute,
            1_000_000,
            Mint::Native,
            q0,
            0,
        );

        let q1 = quote(98, 100);
        let outcome = cache
            .confirm(token.as_str(), &principal, q1, 10)
            .unwrap();
        assert!(matches!(outcome, ConfirmOutcome::ReconfirmRequired { .. }));

        let q2 = quote(95, 100);
        let outcome = cache
            .confirm(token.as_str(), &principal, q2, 20)
            .unwrap();
        assert!(matches!(outcome, ConfirmOutcome::MaxSlippageExceeded));

        // Session is gone after the abort.
        assert!(cache.get(token.as_str(), &principal, 30).is_none());
    }

    #[test]
    fn p11_within_policy_proceeds_and_consumes() {
        let cache = ConfirmationCache::new();
        let principal = PrincipalId::new("1");
        let q0 = quote(100, 100);
        let token = cache.store(
            principal.clone(),
            ConfirmationKind::SwapExecute,
            1_000_000,
            Mint::Native,
            q0,
            0,
        );

        let q1 = quote(99, 100); // 1% drop, exactly at the 100bps boundary: not > threshold
        let outcome = cache
            .confirm(token.as_str(), &principal, q1, 10)
            .unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Proceed { .. }));
        assert!(cache.get(token.as_str(), &principal, 10).is_none());
    }

    #[test]
    fn cross_principal_access_is_not_found() {
        let cache = ConfirmationCache::new();
        let owner = PrincipalId::new("1");
        let attacker = PrincipalId::new("2");
        let token = cache.store(
            owner.clone(),
            ConfirmationKind::SwapExecute,
            1_000_000,
            Mint::Native,
            quote(100, 100),
            0,
        );
        assert!(cache.get(token.as_str(), &attacker, 10).is_none());
        assert!(cache.get(token.as_str(), &owner, 10).is_some());
    }

    #[test]
    fn p4_expired_session_is_not_found_and_evicted() {
        let cache = ConfirmationCache::new();
        let principal = PrincipalId::new("1");
        let token = cache.store(
            principal.clone(),
            ConfirmationKind::SwapExecute,
            1_000_000,
            Mint::Native,
            quote(100, 100),
            0,
        );
        let far_future = custodia_core::constants::CONFIRMATION_TTL_MS + 1;
        assert!(cache.get(token.as_str(), &principal, far_future).is_none());
    }
}
