//! Error-message sanitization (spec.md §4.4 step 4, §7): strip URLs,
//! API-key-shaped headers, and long opaque substrings from any text that
//! originated outside this process before it reaches a terminal frame.

use once_cell::sync::Lazy;
use regex::Regex;

use custodia_core::constants::SANITIZE_MIN_OPAQUE_LEN;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").unwrap());

static AUTH_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(authorization|api[-_]?key)\s*[:=]\s*\S+").unwrap());

static OPAQUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"[A-Za-z0-9_\-]{{{},}}", SANITIZE_MIN_OPAQUE_LEN)).unwrap()
});

/// Replace URLs, auth-header-shaped substrings, and ≥40-char alphanumeric
/// runs with fixed placeholders. Applied to any message sourced from the
/// quote aggregator or ledger RPC before it is shown to an end user.
pub fn sanitize_external_message(raw: &str) -> String {
    let stage1 = URL_RE.replace_all(raw, "[url]");
    let stage2 = AUTH_HEADER_RE.replace_all(&stage1, "[redacted]");
    let stage3 = OPAQUE_RE.replace_all(&stage2, "[opaque]");
    stage3.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls() {
        let msg = "failed calling https://aggregator.example.com/v6/quote?key=abc";
        let out = sanitize_external_message(msg);
        assert!(!out.contains("https://"));
        assert!(out.contains("[url]"));
    }

    #[test]
    fn strips_auth_headers() {
        let msg = "request failed, Authorization: Bearer sk-abcdef123456";
        let out = sanitize_external_message(msg);
        assert!(!out.to_lowercase().contains("bearer"));
    }

    #[test]
    fn strips_long_opaque_runs() {
        let long = "a".repeat(48);
        let msg = format!("signature mismatch for {long}");
        let out = sanitize_external_message(&msg);
        assert!(!out.contains(&long));
        assert!(out.contains("[opaque]"));
    }

    #[test]
    fn leaves_short_text_untouched() {
        let msg = "insufficient funds";
        assert_eq!(sanitize_external_message(msg), msg);
    }
}
