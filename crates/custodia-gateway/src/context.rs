//! Per-request context threaded through the plugin chain. Each plugin may
//! read fields set by an earlier plugin (role-loading sets `role`) but
//! never reorders itself relative to the others — order is fixed at boot
//! by `GatewayPipeline::assemble`.

use custodia_core::principal::Role;
use custodia_core::types::{PrincipalId, TimestampMs};

use crate::command::Command;

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub identity: PrincipalId,
    pub command: Command,
    pub now_ms: TimestampMs,
    /// Filled in by the role-loading plugin; `None` until then, and still
    /// `None` afterwards for an identity with no authorization row.
    pub role: Option<Role>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, identity: PrincipalId, command: Command, now_ms: TimestampMs) -> Self {
        Self {
            request_id: request_id.into(),
            identity,
            command,
            now_ms,
            role: None,
        }
    }
}
