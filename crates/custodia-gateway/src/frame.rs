//! Response envelope and frame stream shared by every plugin.

use std::pin::Pin;

use futures::Stream;
use serde::Serialize;

use custodia_core::principal::AuthorizedPrincipal;
use custodia_core::swap::{FrameMode, SwapProgressFrame, SwapResult};
use custodia_core::InviteToken;

/// The payload of one frame. A superset of every use-case's result type —
/// the dispatcher maps each handler's native result onto one variant here
/// so the pipeline's output shape does not depend on which command ran.
#[derive(Clone, Debug, Serialize)]
pub enum ResponsePayload {
    Text(String),
    SwapProgress(SwapProgressFrame),
    SwapResult(SwapResult),
    Balance { native: u64, tokens: serde_json::Value },
    Authorized(AuthorizedPrincipal),
    Invite(InviteToken),
    Error { message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct GatewayFrame {
    pub response: ResponsePayload,
    pub mode: FrameMode,
}

impl GatewayFrame {
    pub fn final_frame(response: ResponsePayload) -> Self {
        Self { response, mode: FrameMode::Final }
    }

    pub fn partial_frame(response: ResponsePayload) -> Self {
        Self { response, mode: FrameMode::Partial }
    }
}

pub type FrameStream = Pin<Box<dyn Stream<Item = GatewayFrame> + Send>>;

/// Wrap a single response as a one-item, already-final stream. Used by
/// every short-circuiting plugin (rate limit denial, permission denial,
/// the error boundary's own catch-all).
pub fn single_final_frame(response: ResponsePayload) -> FrameStream {
    Box::pin(futures::stream::once(async move { GatewayFrame::final_frame(response) }))
}
