//! Assembles the onion once at boot and exposes the single `execute` entry
//! point an in-process harness (or, eventually, a transport adapter) calls.

use std::sync::Arc;

use tracing::error;

use custodia_auth::Authorizer;
use custodia_cache::RateLimiter;
use custodia_core::error::CustodiaError;
use custodia_crypto::MasterKeyHandle;
use custodia_ledger::BalanceCacheRepository;
use custodia_repo::CustodiaDb;
use custodia_scheduler::DcaScheduler;
use custodia_swap::SwapPipeline;
use custodia_core::types::PrincipalId;

use crate::context::RequestContext;
use crate::dispatcher::Dispatcher;
use crate::frame::{single_final_frame, FrameStream, ResponsePayload};
use crate::handler::Handler;
use crate::plugins::{Authorization, ErrorBoundary, RateLimit, RoleLoading};

pub struct GatewayPipeline {
    entry: Arc<dyn Handler>,
}

impl GatewayPipeline {
    /// Assemble the chain outermost-first, exactly spec.md §4.9's order:
    /// error-boundary → rate-limit → role-loading → authorization →
    /// dispatcher.
    pub fn assemble(
        db: Arc<CustodiaDb>,
        master_key: Arc<MasterKeyHandle>,
        balances: Arc<BalanceCacheRepository>,
        swap_pipeline: Arc<SwapPipeline>,
        scheduler: Arc<DcaScheduler>,
        limiter: Arc<RateLimiter>,
        owner_id: PrincipalId,
    ) -> Self {
        let dispatcher: Arc<dyn Handler> =
            Arc::new(Dispatcher::new(db.clone(), master_key, balances, swap_pipeline, scheduler));
        let authorization: Arc<dyn Handler> = Arc::new(Authorization::new(dispatcher));
        let role_loading: Arc<dyn Handler> = Arc::new(RoleLoading::new(db, authorization));
        let rate_limit: Arc<dyn Handler> = Arc::new(RateLimit::new(limiter, owner_id, role_loading));
        let entry: Arc<dyn Handler> = Arc::new(ErrorBoundary::new(rate_limit));
        Self { entry }
    }

    /// Boot the owner row once, idempotently. Not part of the chain itself
    /// — called by the composition root before the pipeline ever serves a
    /// request.
    pub fn initialize_owner(db: &CustodiaDb, owner_id: &PrincipalId, now_ms: i64) -> Result<(), CustodiaError> {
        Authorizer::new(db).initialize(owner_id, now_ms)
    }

    pub async fn execute(&self, ctx: RequestContext) -> FrameStream {
        let request_id = ctx.request_id.clone();
        match self.entry.handle(ctx).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "gateway: unhandled error reached pipeline entry");
                single_final_frame(ResponsePayload::Error {
                    message: "internal error".to_string(),
                })
            }
        }
    }
}
