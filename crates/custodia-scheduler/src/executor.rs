//! Per-principal DCA purchase execution, decoupled from `custodia-swap`
//! behind a trait so the scheduler's catch-up/monotonicity logic can be
//! tested without driving a real swap pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use custodia_core::principal::Principal;
use custodia_core::transaction::Purchase;
use custodia_core::types::{Amount, Mint, PrincipalId, TimestampMs};
use custodia_repo::CustodiaDb;
use custodia_swap::pipeline::SwapEvent;
use custodia_swap::{SwapPipeline, SwapRequest};

#[derive(Clone, Debug)]
pub enum DcaOutcome {
    Purchased { base_amount: Amount, transaction_id: String },
    InsufficientBalance,
    Failed { reason: String },
}

#[async_trait]
pub trait DcaExecutor: Send + Sync {
    async fn execute_dca_purchase(&self, principal: &Principal, tick_ts: TimestampMs) -> DcaOutcome;
}

/// Drives one DCA purchase through the real swap pipeline: fixed
/// `quote_mint -> target_mint` swap of `amount_quote` units, no prior
/// interactive confirmation (spec.md §4.5 tick execution has no user in
/// the loop).
pub struct SwapPipelineExecutor {
    pipeline: Arc<SwapPipeline>,
    db: Arc<CustodiaDb>,
    quote_mint: Mint,
    target_mint: Mint,
    amount_quote: Amount,
}

impl SwapPipelineExecutor {
    pub fn new(
        pipeline: Arc<SwapPipeline>,
        db: Arc<CustodiaDb>,
        quote_mint: Mint,
        target_mint: Mint,
        amount_quote: Amount,
    ) -> Self {
        Self {
            pipeline,
            db,
            quote_mint,
            target_mint,
            amount_quote,
        }
    }
}

#[async_trait]
impl DcaExecutor for SwapPipelineExecutor {
    async fn execute_dca_purchase(&self, principal: &Principal, tick_ts: TimestampMs) -> DcaOutcome {
        let req = SwapRequest {
            principal_id: principal.id.clone(),
            input_mint: self.quote_mint.clone(),
            output_mint: self.target_mint.clone(),
            input_amount: self.amount_quote,
            slippage_bps: custodia_core::constants::DEFAULT_DYNAMIC_SLIPPAGE_CAP_BPS,
            priority_fee_micro_lamports: None,
        };

        let tx_id = format!("dca-{}-{}", principal.id.as_str(), tick_ts);
        let mut stream = self.pipeline.clone().execute(req, tx_id.clone(), tick_ts);

        while let Some(event) = stream.next().await {
            if let SwapEvent::Finished(result) = event {
                return match result {
                    custodia_core::swap::SwapResult::Success {
                        output_amount,
                        confirmed,
                        ..
                    } => {
                        if confirmed {
                            self.record_purchase(&principal.id, output_amount, &tx_id, tick_ts);
                        }
                        DcaOutcome::Purchased {
                            base_amount: output_amount,
                            transaction_id: tx_id,
                        }
                    }
                    custodia_core::swap::SwapResult::InsufficientBalance { .. } => {
                        DcaOutcome::InsufficientBalance
                    }
                    other => DcaOutcome::Failed {
                        reason: other.kind().to_string(),
                    },
                };
            }
        }
        DcaOutcome::Failed {
            reason: "pipeline closed without a result".into(),
        }
    }
}

impl SwapPipelineExecutor {
    fn record_purchase(&self, principal_id: &PrincipalId, base_amount: Amount, transaction_id: &str, now_ms: TimestampMs) {
        let purchase = Purchase {
            id: format!("purchase-{transaction_id}"),
            principal_id: principal_id.clone(),
            mint: self.target_mint.clone(),
            quote_amount_spent: self.amount_quote,
            base_amount_received: base_amount,
            transaction_id: transaction_id.to_string(),
            executed_at: now_ms,
        };
        if let Err(e) = self.db.put_purchase(&purchase) {
            tracing::error!(error = %e, "failed to persist DCA purchase");
        }

        let mut portfolio = self
            .db
            .get_portfolio(principal_id.as_str())
            .ok()
            .flatten()
            .unwrap_or_else(|| custodia_core::portfolio::Portfolio::new(principal_id.clone()));
        portfolio.record_purchase(&self.target_mint, self.amount_quote, base_amount, now_ms);
        if let Err(e) = self.db.put_portfolio(&portfolio) {
            tracing::error!(error = %e, "failed to persist portfolio rollup");
        }
    }
}
