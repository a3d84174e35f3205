//! Swap execution pipeline (spec.md §4.4): validate, resolve signer, check
//! balance, quote, build, sign, submit, await confirmation, persist,
//! invalidate the balance cache. Driven as a `tokio::task` pushing frames
//! into an unbounded channel, exposed to the caller as a
//! `tokio_stream`-backed `Stream` — the closest stable-Rust equivalent of
//! a generator, since there is no native `yield` to suspend the pipeline
//! between steps (spec.md §9 "pull-based stream" re-architecture).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use zeroize::Zeroize;

use custodia_core::constants::{
    DEFAULT_DYNAMIC_SLIPPAGE_CAP_BPS, DEFAULT_PRIORITY_FEE_CEILING_MICRO_LAMPORTS,
    DEFAULT_SUBMIT_CONFIRM_TIMEOUT_MS, MIN_SWAP_AMOUNT_NATIVE_LAMPORTS,
    MIN_SWAP_AMOUNT_SPL_BASE_UNITS, SUPPORTED_SPL_MINTS,
};
use custodia_core::swap::{SwapProgressFrame, SwapResult};
use custodia_core::transaction::Transaction;
use custodia_core::types::{Address, Amount, BasisPoints, Mint, PrincipalId, TimestampMs, TxSignature};
use custodia_crypto::{MasterKeyHandle, Signer};
use custodia_ledger::{BalanceCacheRepository, BatchRpcClient};
use custodia_repo::CustodiaDb;
use custodia_resilience::sanitize_external_message;

use crate::aggregator::{QuoteAggregatorClient, QuoteRequest};

/// One caller-initiated swap. `input_amount` and `slippage_bps` are
/// expected to already be validated against the principal's confirmed
/// quote by the caller (`custodia-custody::ConfirmationCache`) for
/// interactive flows; the DCA scheduler drives this pipeline directly with
/// no prior confirmation step, per spec.md §4.5.
#[derive(Clone, Debug)]
pub struct SwapRequest {
    pub principal_id: PrincipalId,
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub input_amount: Amount,
    pub slippage_bps: BasisPoints,
    pub priority_fee_micro_lamports: Option<u64>,
}

/// One item of the pipeline's output stream: either a non-terminal
/// progress update or the single closing result. The channel closes
/// immediately after the one `Finished` item, so a consumer never needs to
/// distinguish "more frames coming" out of band.
#[derive(Clone, Debug)]
pub enum SwapEvent {
    Progress(SwapProgressFrame),
    Finished(SwapResult),
}

pub type SwapEventStream = UnboundedReceiverStream<SwapEvent>;

/// The "0.01 of quote asset" floor of spec.md §4.4 step 1, per-mint since
/// native and SPL amounts are denominated in different base units.
fn min_swap_amount(mint: &Mint) -> Amount {
    match mint {
        Mint::Native => MIN_SWAP_AMOUNT_NATIVE_LAMPORTS,
        Mint::Spl(_) => MIN_SWAP_AMOUNT_SPL_BASE_UNITS,
    }
}

/// Whether `mint` is in the set this deployment can route a swap through
/// (spec.md §4.4 step 1 "asset ∈ supported set"). Native is always
/// supported; SPL mints are checked against the configured allow-list.
fn is_supported_mint(mint: &Mint) -> bool {
    match mint {
        Mint::Native => true,
        Mint::Spl(addr) => SUPPORTED_SPL_MINTS.contains(&addr.as_str()),
    }
}

/// Where the signer for a swap comes from. Production resolves a fresh
/// `Signer` from the principal's encrypted blob for the lifetime of one
/// signing scope; development mode may pin a single process-wide signer
/// (`DEV_WALLET_PRIVATE_KEY`) to skip per-principal custody entirely.
enum ResolvedSigner {
    Ephemeral(Signer),
    Pinned(Arc<Signer>),
}

impl ResolvedSigner {
    fn address(&self) -> &Address {
        match self {
            ResolvedSigner::Ephemeral(s) => s.address(),
            ResolvedSigner::Pinned(s) => s.address(),
        }
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        match self {
            ResolvedSigner::Ephemeral(s) => s.sign(message),
            ResolvedSigner::Pinned(s) => s.sign(message),
        }
    }
}

pub struct SwapPipeline {
    aggregator: Arc<dyn QuoteAggregatorClient>,
    balances: Arc<BalanceCacheRepository>,
    rpc: BatchRpcClient,
    db: Arc<CustodiaDb>,
    master_key: Arc<MasterKeyHandle>,
    dev_signer: Option<Arc<Signer>>,
    confirm_timeout_ms: u64,
    confirm_poll_interval_ms: u64,
}

impl SwapPipeline {
    pub fn new(
        aggregator: Arc<dyn QuoteAggregatorClient>,
        balances: Arc<BalanceCacheRepository>,
        rpc: BatchRpcClient,
        db: Arc<CustodiaDb>,
        master_key: Arc<MasterKeyHandle>,
        dev_signer: Option<Arc<Signer>>,
    ) -> Self {
        Self {
            aggregator,
            balances,
            rpc,
            db,
            master_key,
            dev_signer,
            confirm_timeout_ms: DEFAULT_SUBMIT_CONFIRM_TIMEOUT_MS,
            confirm_poll_interval_ms: 1_000,
        }
    }

    pub fn with_confirm_timeout_ms(mut self, ms: u64) -> Self {
        self.confirm_timeout_ms = ms;
        self
    }

    /// Run the full pipeline for `req`, starting at `now_ms`. Returns
    /// immediately with a stream; the work happens in a spawned task.
    pub fn execute(self: Arc<Self>, req: SwapRequest, tx_id: String, now_ms: TimestampMs) -> SwapEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.run(req, tx_id, now_ms, &tx);
        });
        UnboundedReceiverStream::new(rx)
    }

    async fn run(&self, req: SwapRequest, tx_id: String, now_ms: TimestampMs, tx: &mpsc::UnboundedSender<SwapEvent>) {
        macro_rules! finish {
            ($result:expr) => {{
                let _ = tx.send(SwapEvent::Finished($result));
                return;
            }};
        }
        macro_rules! progress {
            ($frame:expr) => {
                let _ = tx.send(SwapEvent::Progress($frame));
            };
        }

        progress!(SwapProgressFrame::ValidatingRequest);
        let min_amount = min_swap_amount(&req.input_mint);
        if req.input_amount == 0 || req.input_amount < min_amount {
            finish!(SwapResult::InvalidAmount {
                reason: format!(
                    "amount must be at least {min_amount} base units (0.01 of quote asset)"
                ),
            });
        }
        if !is_supported_mint(&req.input_mint) || !is_supported_mint(&req.output_mint) {
            finish!(SwapResult::Unavailable {
                reason: "asset is not in the supported set".into(),
            });
        }
        if req.input_mint == req.output_mint {
            finish!(SwapResult::InvalidAsset {
                reason: "input and output asset must differ".into(),
            });
        }
        if req.slippage_bps > 10_000 {
            finish!(SwapResult::InvalidAmount {
                reason: "slippage must be between 0 and 10000 bps".into(),
            });
        }

        progress!(SwapProgressFrame::ResolvingSigner);
        let principal = match self.db.get_principal(req.principal_id.as_str()) {
            Ok(Some(p)) => p,
            Ok(None) => finish!(SwapResult::NoWallet),
            Err(e) => {
                tracing::error!(error = %e, "storage error resolving principal");
                finish!(SwapResult::RpcError {
                    message: "internal storage error".into(),
                });
            }
        };

        let signer = match self.resolve_signer(&principal) {
            Ok(Some(s)) => s,
            Ok(None) => finish!(SwapResult::NoWallet),
            Err(e) => {
                tracing::error!(error = %e, "failed to resolve signer");
                finish!(SwapResult::RpcError {
                    message: "internal key custody error".into(),
                });
            }
        };
        let address = signer.address().clone();

        progress!(SwapProgressFrame::CheckingBalance);
        let mints = match &req.input_mint {
            Mint::Native => Vec::new(),
            Mint::Spl(addr) => vec![addr.clone()],
        };
        let snapshot = match self.balances.get_balances(address.as_str(), &mints, now_ms).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "balance fetch failed");
                finish!(SwapResult::RpcError {
                    message: "could not fetch balance".into(),
                });
            }
        };
        let available = match &req.input_mint {
            Mint::Native => snapshot.native,
            Mint::Spl(addr) => snapshot.tokens.get(addr).copied().unwrap_or(0),
        };
        if available < req.input_amount {
            finish!(SwapResult::InsufficientBalance {
                required: req.input_amount,
                available,
            });
        }

        progress!(SwapProgressFrame::RequestingQuote);
        // Dynamic-slippage cap (spec.md §4.4 step 5): never request more
        // tolerance than the protective ceiling, regardless of what the
        // caller or a previously confirmed quote asked for.
        let capped_slippage_bps = req.slippage_bps.min(DEFAULT_DYNAMIC_SLIPPAGE_CAP_BPS);
        let quote = match self
            .aggregator
            .quote(QuoteRequest {
                input_mint: req.input_mint.clone(),
                output_mint: req.output_mint.clone(),
                amount: req.input_amount,
                slippage_bps: capped_slippage_bps,
            })
            .await
        {
            Ok(q) => q,
            Err(e) => finish!(SwapResult::QuoteError {
                message: sanitize_external_message(&e.to_string()),
            }),
        };

        progress!(SwapProgressFrame::ConfirmingSlippage { quote: quote.clone() });

        progress!(SwapProgressFrame::BuildingTransaction);
        let priority_fee = req
            .priority_fee_micro_lamports
            .map(|fee| fee.min(DEFAULT_PRIORITY_FEE_CEILING_MICRO_LAMPORTS));
        let blueprint = match self
            .aggregator
            .build_transaction(&quote, &address, priority_fee)
            .await
        {
            Ok(b) => b,
            Err(e) => finish!(SwapResult::BuildError {
                message: sanitize_external_message(&e.to_string()),
            }),
        };

        progress!(SwapProgressFrame::Signing);
        let signed = match self.sign_blueprint(&signer, &blueprint) {
            Ok(s) => s,
            Err(e) => finish!(SwapResult::BuildError {
                message: sanitize_external_message(&e),
            }),
        };

        progress!(SwapProgressFrame::Submitting);
        let signature = match self
            .rpc
            .call_single("sendTransaction", serde_json::json!([signed]))
            .await
        {
            Ok(v) => v.as_str().unwrap_or_default().to_string(),
            // No Transaction row on this path: the ledger never accepted the
            // submission, so there is nothing that "succeeded" to record
            // (spec.md §3 "written only after on-chain submission succeeds").
            Err(e) => finish!(SwapResult::SendError {
                message: sanitize_external_message(&e.to_string()),
            }),
        };
        let signature = TxSignature(signature);

        let mut transaction = Transaction::new_submitted(
            tx_id,
            req.principal_id.clone(),
            req.input_mint.clone(),
            req.output_mint.clone(),
            req.input_amount,
            req.slippage_bps,
            now_ms,
        );

        progress!(SwapProgressFrame::AwaitingConfirmation {
            signature: signature.clone()
        });
        let confirmed = self.poll_confirmation(&signature).await;

        self.balances.invalidate(address.as_str());

        if confirmed {
            transaction.mark_confirmed(signature.clone(), quote.output_amount, now_ms);
        }
        if let Err(e) = self.db.put_transaction(&transaction) {
            tracing::error!(error = %e, "failed to persist transaction after submission");
        }

        finish!(SwapResult::Success {
            signature,
            output_amount: quote.output_amount,
            confirmed,
        });
    }

    fn resolve_signer(&self, principal: &custodia_core::principal::Principal) -> Result<Option<ResolvedSigner>, custodia_core::error::CustodiaError> {
        if let Some(dev) = &self.dev_signer {
            return Ok(Some(ResolvedSigner::Pinned(dev.clone())));
        }
        let Some(blob) = &principal.encrypted_secret else {
            return Ok(None);
        };
        let mut seed = self
            .master_key
            .decrypt(blob)
            .map_err(|e| custodia_core::error::CustodiaError::Crypto(e.to_string()))?;
        let signer = Signer::from_seed(&seed)
            .map_err(|e| custodia_core::error::CustodiaError::Crypto(e.to_string()))?;
        seed.zeroize();
        Ok(Some(ResolvedSigner::Ephemeral(signer)))
    }

    /// Attach a detached Ed25519 signature to the aggregator's unsigned
    /// blueprint. The combined wire format (`blueprint ‖ signature`,
    /// base64) is opaque to everything except the ledger node, matching
    /// spec.md's treatment of the signed-transaction payload as opaque
    /// bytes handed to `sendTransaction`.
    fn sign_blueprint(&self, signer: &ResolvedSigner, blueprint_b64: &str) -> Result<String, String> {
        use base64::Engine;
        let blueprint_bytes = base64::engine::general_purpose::STANDARD
            .decode(blueprint_b64)
            .map_err(|_| "malformed transaction blueprint".to_string())?;
        let signature = signer.sign(&blueprint_bytes);
        let mut combined = Vec::with_capacity(blueprint_bytes.len() + signature.len());
        combined.extend_from_slice(&blueprint_bytes);
        combined.extend_from_slice(&signature);
        Ok(base64::engine::general_purpose::STANDARD.encode(combined))
    }

    /// Poll `getSignatureStatuses` until confirmed or `confirm_timeout_ms`
    /// elapses. Returns `false` (not an error) on timeout — spec.md §4.4
    /// treats "submitted but not yet confirmed" as a successful outcome
    /// with `confirmed = false`, not a failure.
    async fn poll_confirmation(&self, signature: &TxSignature) -> bool {
        let deadline = Duration::from_millis(self.confirm_timeout_ms);
        let interval = Duration::from_millis(self.confirm_poll_interval_ms);
        let start = tokio::time::Instant::now();

        loop {
            match self
                .rpc
                .call_single("getSignatureStatuses", serde_json::json!([[signature.0]]))
                .await
            {
                Ok(value) => {
                    let confirmed = value
                        .get("value")
                        .and_then(|v| v.get(0))
                        .and_then(|status| status.get("confirmationStatus"))
                        .and_then(|s| s.as_str())
                        .map(|s| s == "confirmed" || s == "finalized")
                        .unwrap_or(false);
                    if confirmed {
                        return true;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "confirmation poll failed, retrying");
                }
            }
            if start.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use custodia_core::swap::SwapQuote;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAggregator {
        out_amount: Amount,
        price_impact_bps: u32,
        quote_calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteAggregatorClient for FakeAggregator {
        async fn quote(&self, req: QuoteRequest) -> Result<SwapQuote, custodia_core::error::CustodiaError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SwapQuote {
                input_mint: req.input_mint,
                output_mint: req.output_mint,
                input_amount: req.amount,
                output_amount: self.out_amount,
                price_impact_bps: self.price_impact_bps,
                slippage_bps: req.slippage_bps,
                route: serde_json::Value::Null,
            })
        }

        async fn build_transaction(
            &self,
            _quote: &SwapQuote,
            _payer: &Address,
            _priority_fee_micro_lamports: Option<u64>,
        ) -> Result<String, custodia_core::error::CustodiaError> {
            use base64::Engine;
            Ok(base64::engine::general_purpose::STANDARD.encode(b"blueprint-bytes"))
        }
    }

    fn test_master_key() -> MasterKeyHandle {
        use base64::Engine;
        let key = [9u8; 32];
        let b64 = base64::engine::general_purpose::STANDARD.encode(key);
        MasterKeyHandle::init(&b64).unwrap()
    }

    fn test_pipeline(aggregator: Arc<FakeAggregator>) -> Arc<SwapPipeline> {
        let db = Arc::new(CustodiaDb::open_temporary().unwrap());
        let master_key = Arc::new(test_master_key());
        let rpc = BatchRpcClient::new("http://localhost:1");
        let balances = Arc::new(BalanceCacheRepository::new(rpc.clone()));
        Arc::new(SwapPipeline::new(aggregator, balances, rpc, db, master_key, None))
    }

    async fn run_to_finish(pipeline: Arc<SwapPipeline>, req: SwapRequest) -> SwapResult {
        use futures::StreamExt;
        let mut stream = pipeline.execute(req, "tx1".into(), 0);
        let mut finished = None;
        while let Some(event) = stream.next().await {
            if let SwapEvent::Finished(result) = event {
                finished = Some(result);
            }
        }
        finished.expect("pipeline must always emit a terminal frame")
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_before_any_io() {
        let aggregator = Arc::new(FakeAggregator {
            out_amount: 100,
            price_impact_bps: 5,
            quote_calls: AtomicUsize::new(0),
        });
        let pipeline = test_pipeline(aggregator.clone());
        let req = SwapRequest {
            principal_id: PrincipalId::new("1"),
            input_mint: Mint::Native,
            output_mint: Mint::Spl(custodia_core::constants::SUPPORTED_SPL_MINTS[0].to_string()),
            input_amount: 0,
            slippage_bps: 100,
            priority_fee_micro_lamports: None,
        };
        let result = run_to_finish(pipeline, req).await;
        assert!(matches!(result, SwapResult::InvalidAmount { .. }));
        assert_eq!(aggregator.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn amount_below_minimum_is_rejected() {
        let aggregator = Arc::new(FakeAggregator {
            out_amount: 100,
            price_impact_bps: 5,
            quote_calls: AtomicUsize::new(0),
        });
        let pipeline = test_pipeline(aggregator.clone());
        let req = SwapRequest {
            principal_id: PrincipalId::new("1"),
            input_mint: Mint::Native,
            output_mint: Mint::Spl(custodia_core::constants::SUPPORTED_SPL_MINTS[0].to_string()),
            input_amount: MIN_SWAP_AMOUNT_NATIVE_LAMPORTS - 1,
            slippage_bps: 100,
            priority_fee_micro_lamports: None,
        };
        let result = run_to_finish(pipeline, req).await;
        assert!(matches!(result, SwapResult::InvalidAmount { .. }));
        assert_eq!(aggregator.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_asset_is_rejected_before_any_io() {
        let aggregator = Arc::new(FakeAggregator {
            out_amount: 100,
            price_impact_bps: 5,
            quote_calls: AtomicUsize::new(0),
        });
        let pipeline = test_pipeline(aggregator.clone());
        let req = SwapRequest {
            principal_id: PrincipalId::new("1"),
            input_mint: Mint::Native,
            output_mint: Mint::Spl("not-a-listed-mint".into()),
            input_amount: MIN_SWAP_AMOUNT_NATIVE_LAMPORTS,
            slippage_bps: 100,
            priority_fee_micro_lamports: None,
        };
        let result = run_to_finish(pipeline, req).await;
        assert!(matches!(result, SwapResult::Unavailable { .. }));
        assert_eq!(aggregator.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_wallet_short_circuits_before_quote() {
        let db = Arc::new(CustodiaDb::open_temporary().unwrap());
        let master_key = Arc::new(test_master_key());
        let aggregator = Arc::new(FakeAggregator {
            out_amount: 100,
            price_impact_bps: 5,
            quote_calls: AtomicUsize::new(0),
        });
        let rpc = BatchRpcClient::new("http://localhost:1");
        let balances = Arc::new(BalanceCacheRepository::new(rpc.clone()));

        let pipeline = Arc::new(SwapPipeline::new(
            aggregator.clone(),
            balances,
            rpc,
            db,
            master_key,
            None,
        ));

        let req = SwapRequest {
            principal_id: PrincipalId::new("no-such-principal"),
            input_mint: Mint::Native,
            output_mint: Mint::Spl(custodia_core::constants::SUPPORTED_SPL_MINTS[0].to_string()),
            input_amount: MIN_SWAP_AMOUNT_NATIVE_LAMPORTS,
            slippage_bps: 100,
            priority_fee_micro_lamports: None,
        };

        use futures::StreamExt;
        let mut stream = pipeline.execute(req, "tx1".into(), 0);
        let mut finished = None;
        while let Some(event) = stream.next().await {
            if let SwapEvent::Finished(result) = event {
                finished = Some(result);
            }
        }
        assert!(matches!(finished, Some(SwapResult::NoWallet)));
        assert_eq!(aggregator.quote_calls.load(Ordering::SeqCst), 0);
    }
}
