//! Rate-limit plugin (spec.md §4.9 step 2): owner identity bypasses
//! entirely; every other identity is keyed by its principal id against a
//! shared sliding-window limiter.

use std::sync::Arc;

use async_trait::async_trait;

use custodia_cache::RateLimiter;
use custodia_core::error::CustodiaError;
use custodia_core::types::PrincipalId;

use crate::context::RequestContext;
use crate::frame::FrameStream;
use crate::handler::Handler;

/// Rate limiting runs before role-loading (spec.md §4.9 step order), so the
/// owner bypass cannot be keyed on a resolved role yet — it is keyed
/// directly on the one owner principal id instead.
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    owner_id: PrincipalId,
    next: Arc<dyn Handler>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, owner_id: PrincipalId, next: Arc<dyn Handler>) -> Self {
        Self { limiter, owner_id, next }
    }
}

#[async_trait]
impl Handler for RateLimit {
    async fn handle(&self, ctx: RequestContext) -> Result<FrameStream, CustodiaError> {
        if ctx.identity == self.owner_id {
            return self.next.handle(ctx).await;
        }

        if !self.limiter.check_and_record(ctx.identity.as_str(), ctx.now_ms) {
            return Err(CustodiaError::RateLimited { retry_after_ms: 0 });
        }

        self.next.handle(ctx).await
    }
}
