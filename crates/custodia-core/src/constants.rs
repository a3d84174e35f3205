//! ─── Custodia protocol constants ────────────────────────────────────────

// ── Custody ──────────────────────────────────────────────────────────────

/// AEAD key size in bytes (ChaCha20Poly1305, 256-bit).
pub const AEAD_KEY_BYTES: usize = 32;

/// AEAD nonce size in bytes (96-bit, per spec).
pub const AEAD_NONCE_BYTES: usize = 12;

/// AEAD authentication tag size in bytes (128-bit).
pub const AEAD_TAG_BYTES: usize = 16;

// ── Session / token lifetimes ────────────────────────────────────────────

/// Default TTL for a one-time secret URL (15 minutes).
pub const SECRET_URL_TTL_MS: i64 = 15 * 60 * 1000;

/// TTL of stage 1 of an import session — the token handed out by `store`,
/// consumed by the GET that renders the import form (~10 minutes).
pub const IMPORT_TOKEN_TTL_MS: i64 = 10 * 60 * 1000;

/// TTL of stage 2 of an import session — the CSRF/form token issued in
/// exchange for the import token, consumed by the POST (~5 minutes).
pub const FORM_TOKEN_TTL_MS: i64 = 5 * 60 * 1000;

/// Default TTL for a pending swap confirmation (2 minutes).
pub const CONFIRMATION_TTL_MS: i64 = 2 * 60 * 1000;

/// Default TTL for an operation lock (5 minutes) — a stuck lock older than
/// this is considered abandoned and reaped.
pub const OPERATION_LOCK_TTL_MS: i64 = 5 * 60 * 1000;

/// Default TTL for a cached balance snapshot (60 seconds).
pub const BALANCE_CACHE_TTL_MS: i64 = 60_000;

/// Interval on which the background reaper sweeps expired in-memory entries.
pub const REAPER_INTERVAL_MS: u64 = 60_000;

/// Interval on which the rate-limit map is swept for fully-expired windows.
pub const RATE_LIMIT_REAP_INTERVAL_MS: u64 = 5 * 60_000;

// ── Scheduler ────────────────────────────────────────────────────────────

/// Hard cap on the number of missed DCA intervals processed in one catch-up
/// pass, to bound worst-case work after a long outage.
pub const MAX_CATCHUP: u32 = 100;

/// Delay before retrying a failed scheduler tick.
pub const SCHEDULER_RETRY_DELAY_MS: u64 = 60_000;

// ── Auth / invite ────────────────────────────────────────────────────────

/// Default invite-token TTL (24 hours), configurable per spec.md §4.6.
pub const DEFAULT_INVITE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

// ── Swap pipeline ────────────────────────────────────────────────────────

/// Default timeout waiting for ledger confirmation of a submitted swap.
pub const DEFAULT_SUBMIT_CONFIRM_TIMEOUT_MS: u64 = 30_000;

/// Upper bound on slippage tolerance actually sent to the aggregator,
/// regardless of what a caller or a stale confirmed quote requests — a
/// protective ceiling, not the confirmation-pipeline's own slippage check.
pub const DEFAULT_DYNAMIC_SLIPPAGE_CAP_BPS: u32 = 50;

/// Upper bound on the priority fee attached to a build-transaction request.
pub const DEFAULT_PRIORITY_FEE_CEILING_MICRO_LAMPORTS: u64 = 1_000_000;

/// Minimum native-asset swap amount, the "≥ 0.01 of quote asset" floor of
/// spec.md §4.4 step 1, expressed in lamports at 9 decimals.
pub const MIN_SWAP_AMOUNT_NATIVE_LAMPORTS: u64 = 10_000_000;

/// Minimum SPL-token swap amount for the same 0.01-unit floor, assuming the
/// common 6-decimal mint (spec.md leaves per-mint decimals unspecified).
pub const MIN_SWAP_AMOUNT_SPL_BASE_UNITS: u64 = 10_000;

/// Mint addresses this deployment can route a swap through, beyond the
/// always-supported native asset (spec.md §4.4 step 1 "asset ∈ supported
/// set"). Wrapped SOL's pair partners on the aggregator's most commonly
/// routed side.
pub const SUPPORTED_SPL_MINTS: &[&str] = &[
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", // USDC
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", // USDT
];

/// Minimum length of an opaque substring redacted from externally-sourced
/// error text before it is shown to a caller (API keys, signatures, etc).
pub const SANITIZE_MIN_OPAQUE_LEN: usize = 40;

// ── Resilience ───────────────────────────────────────────────────────────

/// Default number of retry attempts for a transient external failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between retries.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 250;

// ── Tokens ───────────────────────────────────────────────────────────────

/// Byte length of the random token backing one-time secret URLs, import
/// sessions, and invite tokens before base64 encoding (22-char url-safe
/// base64 output, per spec).
pub const TOKEN_RANDOM_BYTES: usize = 16;
