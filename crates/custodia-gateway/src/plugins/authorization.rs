//! Authorization plugin (spec.md §4.9 step 4): a command's `requires_role`
//! must be at or below the resolved role, else a permission-denied final
//! frame closes the pipeline without reaching the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;

use custodia_core::error::CustodiaError;

use crate::context::RequestContext;
use crate::frame::FrameStream;
use crate::handler::Handler;

pub struct Authorization {
    next: Arc<dyn Handler>,
}

impl Authorization {
    pub fn new(next: Arc<dyn Handler>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl Handler for Authorization {
    async fn handle(&self, ctx: RequestContext) -> Result<FrameStream, CustodiaError> {
        match ctx.command.requires_role() {
            None => {}
            Some(required) => match ctx.role {
                None => {
                    return Err(CustodiaError::NotAuthorized(ctx.identity.to_string()));
                }
                Some(have) if have >= required => {}
                Some(_) => {
                    return Err(CustodiaError::PermissionDenied(format!(
                        "{} requires role {required} or higher",
                        ctx.command.name()
                    )));
                }
            },
        }

        self.next.handle(ctx).await
    }
}
