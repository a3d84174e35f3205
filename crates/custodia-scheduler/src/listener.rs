//! Scheduler observer hook (spec.md §4.5 "notifies listeners"),
//! generalized from the teacher's direct-call notification style into a
//! typed trait so the composition root can wire in an operator-audit or
//! notification adapter without `custodia-scheduler` depending on one.

use custodia_core::types::TimestampMs;

/// One notable scheduler transition or tick outcome.
#[derive(Clone, Debug)]
pub enum SchedulerEvent {
    Started { now_ms: TimestampMs },
    Stopped { now_ms: TimestampMs },
    TickCompleted {
        tick_ts: TimestampMs,
        purchased: usize,
        skipped: usize,
        failed: usize,
    },
    TickFailed { tick_ts: TimestampMs },
}

/// Observer of scheduler lifecycle/tick events. The scheduler holds these
/// as `Weak` references — it never keeps a listener alive, matching
/// spec.md §5's "cyclic relationship" note that the scheduler must not own
/// whatever it notifies.
pub trait SchedulerListener: Send + Sync {
    fn on_scheduler_event(&self, event: SchedulerEvent);
}
