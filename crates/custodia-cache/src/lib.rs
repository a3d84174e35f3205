pub mod lock;
pub mod rate_limit;

pub use lock::OperationLock;
pub use rate_limit::RateLimiter;
