//! Error boundary plugin (spec.md §4.9 step 1). Outermost link: catches any
//! `Err` surfaced by `next` and collapses it into a single sanitized final
//! frame instead of letting it escape the pipeline.

use async_trait::async_trait;
use tracing::error;

use custodia_core::error::CustodiaError;
use custodia_resilience::sanitize_external_message;

use crate::context::RequestContext;
use crate::frame::{single_final_frame, FrameStream, ResponsePayload};
use crate::handler::Handler;

pub struct ErrorBoundary {
    next: std::sync::Arc<dyn Handler>,
}

impl ErrorBoundary {
    pub fn new(next: std::sync::Arc<dyn Handler>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl Handler for ErrorBoundary {
    async fn handle(&self, ctx: RequestContext) -> Result<FrameStream, CustodiaError> {
        let request_id = ctx.request_id.clone();
        match self.next.handle(ctx).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                error!(request_id = %request_id, error = %e, "gateway: request failed");
                let message = sanitize_external_message(&e.to_string());
                Ok(single_final_frame(ResponsePayload::Error { message }))
            }
        }
    }
}
