//! DTOs for the swap execution pipeline — shared between `custodia-swap`,
//! `custodia-gateway`, and anything that consumes the progress-frame stream.

use serde::{Deserialize, Serialize};

use crate::types::{Amount, BasisPoints, Mint, TxSignature};

/// A routed quote returned by the aggregator for one `(input, output,
/// amount)` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwapQuote {
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub input_amount: Amount,
    pub output_amount: Amount,
    pub price_impact_bps: BasisPoints,
    pub slippage_bps: BasisPoints,
    /// Opaque route payload handed back to the aggregator unchanged when
    /// requesting a transaction blueprint for this quote.
    pub route: serde_json::Value,
}

/// One non-terminal update emitted while a swap is in flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SwapProgressFrame {
    ValidatingRequest,
    ResolvingSigner,
    CheckingBalance,
    RequestingQuote,
    ConfirmingSlippage { quote: SwapQuote },
    BuildingTransaction,
    Signing,
    Submitting,
    AwaitingConfirmation { signature: TxSignature },
}

/// The single terminal frame of a swap execution. Exactly one of these is
/// emitted to close the stream — the ten kinds of spec.md §4.4/§7.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SwapResult {
    /// Submission succeeded; `confirmed = false` means the wait-for-finality
    /// poll timed out, not that the swap failed.
    Success {
        signature: TxSignature,
        output_amount: Amount,
        confirmed: bool,
    },
    Unavailable {
        reason: String,
    },
    InvalidAmount {
        reason: String,
    },
    InvalidAsset {
        reason: String,
    },
    NoWallet,
    InsufficientBalance {
        required: Amount,
        available: Amount,
    },
    QuoteError {
        message: String,
    },
    BuildError {
        message: String,
    },
    SendError {
        message: String,
    },
    RpcError {
        message: String,
    },
}

impl SwapResult {
    /// Tag used for logging/metrics without exposing message payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SwapResult::Success { .. } => "success",
            SwapResult::Unavailable { .. } => "unavailable",
            SwapResult::InvalidAmount { .. } => "invalid_amount",
            SwapResult::InvalidAsset { .. } => "invalid_asset",
            SwapResult::NoWallet => "no_wallet",
            SwapResult::InsufficientBalance { .. } => "insufficient_balance",
            SwapResult::QuoteError { .. } => "quote_error",
            SwapResult::BuildError { .. } => "build_error",
            SwapResult::SendError { .. } => "send_error",
            SwapResult::RpcError { .. } => "rpc_error",
        }
    }
}

/// Mode tag carried alongside each frame so a transport-agnostic consumer
/// knows whether the stream has more frames coming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameMode {
    Partial,
    Final,
}
