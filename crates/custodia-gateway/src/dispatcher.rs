//! Dispatcher (spec.md §4.9 step 5): the innermost handler, routing
//! `(command, args)` to the use-case it names and returning a lazy
//! sequence of `{response, mode}` frames — generalized from
//! `chronx-p2p`'s message-kind `match` dispatch into a chain terminus
//! instead of a network message handler.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use custodia_auth::Authorizer;
use custodia_core::error::CustodiaError;
use custodia_core::types::{Address, Mint};
use custodia_crypto::{MasterKeyHandle, Signer};
use custodia_ledger::BalanceCacheRepository;
use custodia_repo::CustodiaDb;
use custodia_scheduler::DcaScheduler;
use custodia_swap::{SwapEvent, SwapPipeline, SwapRequest};

use crate::command::Command;
use crate::context::RequestContext;
use crate::frame::{single_final_frame, FrameStream, GatewayFrame, ResponsePayload};
use crate::handler::Handler;

pub struct Dispatcher {
    db: Arc<CustodiaDb>,
    master_key: Arc<MasterKeyHandle>,
    balances: Arc<BalanceCacheRepository>,
    swap_pipeline: Arc<SwapPipeline>,
    scheduler: Arc<DcaScheduler>,
}

impl Dispatcher {
    pub fn new(
        db: Arc<CustodiaDb>,
        master_key: Arc<MasterKeyHandle>,
        balances: Arc<BalanceCacheRepository>,
        swap_pipeline: Arc<SwapPipeline>,
        scheduler: Arc<DcaScheduler>,
    ) -> Self {
        Self { db, master_key, balances, swap_pipeline, scheduler }
    }

    fn provision_wallet(&self, ctx: &RequestContext) -> Result<ResponsePayload, CustodiaError> {
        let mut principal = self
            .db
            .get_principal(ctx.identity.as_str())?
            .unwrap_or_else(|| custodia_core::principal::Principal::new(ctx.identity.clone(), ctx.now_ms));

        if principal.has_wallet() {
            return Err(CustodiaError::WalletExists(ctx.identity.to_string()));
        }

        let signer = Signer::generate();
        let seed = signer.to_seed_bytes();
        let encrypted = self
            .master_key
            .encrypt(&*seed)
            .map_err(|e| CustodiaError::Crypto(e.to_string()))?;
        drop(seed);

        let address = signer.address().clone();
        principal.provision_wallet(address.clone(), encrypted, ctx.now_ms);
        self.db.put_principal(&principal)?;

        Ok(ResponsePayload::Text(format!("wallet provisioned: {address}")))
    }

    async fn get_balance(&self, ctx: &RequestContext, mints: &[Mint]) -> Result<ResponsePayload, CustodiaError> {
        let principal = self
            .db
            .get_principal(ctx.identity.as_str())?
            .ok_or_else(|| CustodiaError::NoWallet(ctx.identity.to_string()))?;
        let address: Address = principal
            .address
            .clone()
            .ok_or_else(|| CustodiaError::NoWallet(ctx.identity.to_string()))?;

        let mint_strs: Vec<String> = mints
            .iter()
            .filter_map(|m| match m {
                Mint::Native => None,
                Mint::Spl(addr) => Some(addr.clone()),
            })
            .collect();

        let snapshot = self
            .balances
            .get_balances(address.as_str(), &mint_strs, ctx.now_ms)
            .await
            .map_err(|e| CustodiaError::RpcError(e.to_string()))?;

        Ok(ResponsePayload::Balance {
            native: snapshot.native,
            tokens: serde_json::to_value(&snapshot.tokens).unwrap_or(serde_json::Value::Null),
        })
    }

    fn set_dca_enabled(&self, ctx: &RequestContext, enabled: bool) -> Result<ResponsePayload, CustodiaError> {
        let mut principal = self
            .db
            .get_principal(ctx.identity.as_str())?
            .ok_or_else(|| CustodiaError::NoWallet(ctx.identity.to_string()))?;
        principal.dca_enabled = enabled;
        principal.updated_at = ctx.now_ms;
        self.db.put_principal(&principal)?;
        Ok(ResponsePayload::Text(format!("dca enabled = {enabled}")))
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn handle(&self, ctx: RequestContext) -> Result<FrameStream, CustodiaError> {
        match ctx.command.clone() {
            Command::ProvisionWallet => {
                let payload = self.provision_wallet(&ctx)?;
                Ok(single_final_frame(payload))
            }
            Command::GetBalance { mints } => {
                let payload = self.get_balance(&ctx, &mints).await?;
                Ok(single_final_frame(payload))
            }
            Command::SetDcaEnabled(enabled) => {
                let payload = self.set_dca_enabled(&ctx, enabled)?;
                self.scheduler
                    .on_user_status_changed()
                    .await?;
                Ok(single_final_frame(payload))
            }
            Command::ExecuteSwap { input_mint, output_mint, input_amount, slippage_bps } => {
                let req = SwapRequest {
                    principal_id: ctx.identity.clone(),
                    input_mint,
                    output_mint,
                    input_amount,
                    slippage_bps,
                    priority_fee_micro_lamports: None,
                };
                let tx_id = format!("gw-{}", ctx.request_id);
                let stream = self.swap_pipeline.clone().execute(req, tx_id, ctx.now_ms);
                let frames = stream.map(|event| match event {
                    SwapEvent::Progress(frame) => {
                        GatewayFrame::partial_frame(ResponsePayload::SwapProgress(frame))
                    }
                    SwapEvent::Finished(result) => {
                        GatewayFrame::final_frame(ResponsePayload::SwapResult(result))
                    }
                });
                Ok(Box::pin(frames))
            }
            Command::AddAuthorized { target, role } => {
                let authorizer = Authorizer::new(&self.db);
                let entry = authorizer.add(&ctx.identity, &target, role, ctx.now_ms)?;
                Ok(single_final_frame(ResponsePayload::Authorized(entry)))
            }
            Command::RemoveAuthorized { target } => {
                let authorizer = Authorizer::new(&self.db);
                authorizer.remove(&ctx.identity, &target, ctx.now_ms)?;
                Ok(single_final_frame(ResponsePayload::Text(format!("{target} removed"))))
            }
            Command::UpdateRole { target, role } => {
                let authorizer = Authorizer::new(&self.db);
                let entry = authorizer.update_role(&ctx.identity, &target, role, ctx.now_ms)?;
                Ok(single_final_frame(ResponsePayload::Authorized(entry)))
            }
            Command::GenerateInvite { role, ttl_ms } => {
                let authorizer = Authorizer::new(&self.db);
                let invite = authorizer.generate_invite(&ctx.identity, role, ttl_ms, ctx.now_ms)?;
                Ok(single_final_frame(ResponsePayload::Invite(invite)))
            }
            Command::ActivateInvite { token } => {
                let authorizer = Authorizer::new(&self.db);
                let entry = authorizer.activate_invite(&token, &ctx.identity, ctx.now_ms)?;
                Ok(single_final_frame(ResponsePayload::Authorized(entry)))
            }
        }
    }
}
