//! Transient-vs-fatal classification (spec.md §7 propagation policy).
//!
//! `custodia_core::CustodiaError::is_transient` already draws this line for
//! the unified error enum; this module generalizes it so callers that
//! haven't yet mapped a raw external failure (an HTTP status, a JSON-RPC
//! error code) into a `CustodiaError` can still decide whether to retry.

use custodia_core::error::CustodiaError;

/// Whether an external failure is safe to retry locally before it is
/// surfaced to the caller — the transient/fatal split of spec.md §7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Fatal,
}

/// Classify an HTTP status code from the quote aggregator or batch-RPC
/// endpoint. 429 and 5xx are transient; everything else (4xx other than
/// 429) is fatal — retrying a malformed request will not fix it.
pub fn classify_http_status(status: u16) -> ErrorKind {
    if status == 429 || (500..600).contains(&status) {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    }
}

/// Classify a JSON-RPC 2.0 error code. `-32005` ("node is behind") and
/// `-32603` (internal / our own synthesized "missing response") are the
/// codes this system has been observed to retry successfully; everything
/// else is treated as fatal.
pub fn classify_rpc_code(code: i64) -> ErrorKind {
    match code {
        -32005 | -32603 | -32429 => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    }
}

/// Classify an already-mapped `CustodiaError`.
pub fn classify_error(err: &CustodiaError) -> ErrorKind {
    if err.is_transient() {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    }
}
