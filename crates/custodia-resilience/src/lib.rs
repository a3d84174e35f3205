pub mod classify;
pub mod retry;
pub mod sanitize;

pub use classify::{classify_error, classify_http_status, classify_rpc_code, ErrorKind};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sanitize::sanitize_external_message;
