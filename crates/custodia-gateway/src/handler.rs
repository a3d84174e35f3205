//! The `Handler` seam every plugin and the dispatcher implement, generalized
//! from `chronx-rpc`'s tower-middleware composition into a chain of owned
//! trait objects (no `tower`/`jsonrpsee` in this stack — see DESIGN.md).

use async_trait::async_trait;

use custodia_core::error::CustodiaError;

use crate::context::RequestContext;
use crate::frame::FrameStream;

/// One link in the onion. A plugin either short-circuits (returning `Ok`
/// of a single final frame, or `Err` caught by the error boundary) or
/// delegates to `next`. The dispatcher is the innermost handler and has
/// no `next` of its own.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: RequestContext) -> Result<FrameStream, CustodiaError>;
}
