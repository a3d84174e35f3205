//! Persisted records of executed swaps and recorded purchases.

use serde::{Deserialize, Serialize};

use crate::types::{Amount, Mint, PrincipalId, TimestampMs, TxSignature};

/// Outcome of one attempted swap, recorded after the pipeline reaches a
/// terminal frame (success or failure) — see `custodia-swap`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionStatus {
    Submitted,
    Confirmed,
}

/// One row in the transaction ledger. `native_amount` and `asset` are kept
/// as separate columns (see DESIGN.md open-question log) rather than a
/// combined display string, so downstream portfolio math never re-parses
/// a formatted amount.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub principal_id: PrincipalId,
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub input_amount: Amount,
    pub output_amount: Option<Amount>,
    pub native_amount: Amount,
    pub asset: Mint,
    pub slippage_bps: u32,
    pub signature: Option<TxSignature>,
    pub status: TransactionStatus,
    pub created_at: TimestampMs,
    pub confirmed_at: Option<TimestampMs>,
}

/// A single DCA purchase event, persisted for history/reporting and to
/// drive the portfolio cost-basis rollup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub principal_id: PrincipalId,
    pub mint: Mint,
    pub quote_amount_spent: Amount,
    pub base_amount_received: Amount,
    pub transaction_id: String,
    pub executed_at: TimestampMs,
}

impl Transaction {
    pub fn new_submitted(
        id: String,
        principal_id: PrincipalId,
        input_mint: Mint,
        output_mint: Mint,
        input_amount: Amount,
        slippage_bps: u32,
        now_ms: TimestampMs,
    ) -> Self {
        Self {
            id,
            principal_id,
            input_mint: input_mint.clone(),
            output_mint,
            input_amount,
            output_amount: None,
            native_amount: input_amount,
            asset: input_mint,
            slippage_bps,
            signature: None,
            status: TransactionStatus::Submitted,
            created_at: now_ms,
            confirmed_at: None,
        }
    }

    pub fn mark_confirmed(&mut self, signature: TxSignature, output_amount: Amount, now_ms: TimestampMs) {
        self.signature = Some(signature);
        self.output_amount = Some(output_amount);
        self.status = TransactionStatus::Confirmed;
        self.confirmed_at = Some(now_ms);
    }
}
