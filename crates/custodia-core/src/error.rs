use thiserror::Error;

/// The full error taxonomy for the custodial assistant.
///
/// Variants are grouped by the propagation policy that applies to them:
/// validation and auth errors are surfaced to the caller verbatim,
/// external-transient errors are retried by `custodia-resilience` before
/// they ever reach here, and internal errors are logged with a request id
/// and returned to the caller as a generic message.
#[derive(Debug, Error)]
pub enum CustodiaError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid asset: {0}")]
    InvalidAsset(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid slippage: {0}")]
    InvalidSlippage(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("validation failed: {0}")]
    Validation(String),

    // ── Auth ─────────────────────────────────────────────────────────────────
    #[error("principal {0} is not authorized")]
    NotAuthorized(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("principal {0} is already authorized")]
    AlreadyAuthorized(String),

    #[error("role {have} cannot manage role {target}")]
    InsufficientRole { have: String, target: String },

    #[error("invite token already used")]
    InviteAlreadyUsed,

    #[error("invite token not found")]
    InviteNotFound,

    // ── Resource ─────────────────────────────────────────────────────────────
    #[error("principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("no custodial wallet provisioned for {0}")]
    NoWallet(String),

    #[error("wallet already exists for {0}")]
    WalletExists(String),

    #[error("secret not found or already consumed")]
    SecretNotFound,

    #[error("session not found or expired: {0}")]
    SessionNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    // ── State ────────────────────────────────────────────────────────────────
    #[error("operation lock already held by {0}")]
    LockHeld(String),

    #[error("confirmation is not pending (current state: {0})")]
    ConfirmationNotPending(String),

    #[error("slippage exceeded policy: {0}")]
    SlippageExceeded(String),

    #[error("maximum reconfirmation attempts exceeded")]
    MaxReconfirms,

    #[error("scheduler already active")]
    AlreadyActive,

    #[error("scheduler is not active")]
    NotActive,

    #[error("scheduler already running for principal {0}")]
    SchedulerAlreadyRunning(String),

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    // ── External (transient — safe to retry) ────────────────────────────────
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream server error: {0}")]
    UpstreamServerError(String),

    #[error("upstream timed out")]
    Timeout,

    // ── External (fatal — do not retry) ─────────────────────────────────────
    #[error("quote request failed: {0}")]
    QuoteError(String),

    #[error("swap build failed: {0}")]
    BuildError(String),

    #[error("submission failed: {0}")]
    SendError(String),

    #[error("ledger RPC error: {0}")]
    RpcError(String),

    // ── Internal ─────────────────────────────────────────────────────────────
    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CustodiaError {
    /// Whether this error represents a transient external failure that a
    /// caller may reasonably retry (see `custodia-resilience::classify`).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CustodiaError::Network(_)
                | CustodiaError::UpstreamServerError(_)
                | CustodiaError::Timeout
                | CustodiaError::RateLimited { .. }
        )
    }
}
