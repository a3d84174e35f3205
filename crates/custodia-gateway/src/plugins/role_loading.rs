//! Role-loading plugin (spec.md §4.9 step 3): resolves the identity's
//! current role from the authorization store and attaches it to context
//! for the authorization plugin to consult.

use std::sync::Arc;

use async_trait::async_trait;

use custodia_auth::Authorizer;
use custodia_core::error::CustodiaError;
use custodia_repo::CustodiaDb;

use crate::context::RequestContext;
use crate::frame::FrameStream;
use crate::handler::Handler;

pub struct RoleLoading {
    db: Arc<CustodiaDb>,
    next: Arc<dyn Handler>,
}

impl RoleLoading {
    pub fn new(db: Arc<CustodiaDb>, next: Arc<dyn Handler>) -> Self {
        Self { db, next }
    }
}

#[async_trait]
impl Handler for RoleLoading {
    async fn handle(&self, mut ctx: RequestContext) -> Result<FrameStream, CustodiaError> {
        let authorizer = Authorizer::new(&self.db);
        ctx.role = authorizer.role_of(&ctx.identity)?;
        self.next.handle(ctx).await
    }
}
