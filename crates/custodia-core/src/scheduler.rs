use serde::{Deserialize, Serialize};

use crate::types::TimestampMs;

/// Persisted DCA scheduler state. Singleton row (spec.md §3): one tick of
/// this scheduler sweeps every active principal, not one scheduler per
/// principal. `last_run_at` is `None` until the first successful tick;
/// catch-up math (see `custodia-scheduler`) treats a `None` as "run
/// immediately, no backlog".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerState {
    pub interval_ms: i64,
    pub last_run_at: Option<TimestampMs>,
    pub running: bool,
    pub updated_at: TimestampMs,
}

impl SchedulerState {
    pub fn new(interval_ms: i64, now_ms: TimestampMs) -> Self {
        Self {
            interval_ms,
            last_run_at: None,
            running: false,
            updated_at: now_ms,
        }
    }

    /// Number of whole intervals missed since `last_run_at`, per
    /// `missed = floor((now - lastRunAt) / intervalMs)`. Zero if never run.
    pub fn missed_intervals(&self, now_ms: TimestampMs) -> u32 {
        match self.last_run_at {
            None => 0,
            Some(last) if now_ms <= last => 0,
            Some(last) => {
                let elapsed = now_ms - last;
                (elapsed / self.interval_ms.max(1)) as u32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missed_intervals_floors() {
        let mut s = SchedulerState::new(60_000, 0);
        s.last_run_at = Some(0);
        assert_eq!(s.missed_intervals(190_000), 3);
    }

    #[test]
    fn never_run_has_no_backlog() {
        let s = SchedulerState::new(60_000, 0);
        assert_eq!(s.missed_intervals(1_000_000), 0);
    }
}
