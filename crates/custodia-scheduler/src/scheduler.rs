//! Persistent DCA scheduler (spec.md §4.5), grounded on
//! `chronx-consensus/src/difficulty.rs`'s windowed-state-update pattern
//! (`DifficultyConfig` mutating a small persisted struct on each recorded
//! event), generalized from a difficulty-adjustment window into an
//! interval-driven catch-up scheduler, and on `chronx-node::main`'s
//! single `tokio::spawn`'d main loop for the single-owned-timer task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::task::JoinHandle;

use custodia_core::constants::{MAX_CATCHUP, SCHEDULER_RETRY_DELAY_MS};
use custodia_core::error::CustodiaError;
use custodia_core::scheduler::SchedulerState;
use custodia_core::types::TimestampMs;
use custodia_repo::CustodiaDb;

use crate::executor::{DcaExecutor, DcaOutcome};
use crate::listener::{SchedulerEvent, SchedulerListener};

fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

/// Outcome of one tick across every active principal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub purchased: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct DcaScheduler {
    db: Arc<CustodiaDb>,
    executor: Arc<dyn DcaExecutor>,
    interval_ms: i64,
    listeners: Mutex<Vec<Weak<dyn SchedulerListener>>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DcaScheduler {
    pub fn new(db: Arc<CustodiaDb>, executor: Arc<dyn DcaExecutor>, interval_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            db,
            executor,
            interval_ms,
            listeners: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    pub fn add_listener(&self, listener: Weak<dyn SchedulerListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify(&self, event: SchedulerEvent) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|w| w.upgrade().is_some());
        for weak in listeners.iter() {
            if let Some(listener) = weak.upgrade() {
                listener.on_scheduler_event(event.clone());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// No-op if already running or if there are no active-DCA principals;
    /// otherwise persists fresh state, runs catch-up, and spawns the
    /// single background timer task (spec.md §4.5 `start`).
    pub async fn start(self: &Arc<Self>) -> Result<(), CustodiaError> {
        if self.is_running() {
            return Ok(());
        }
        let active = self.db.count_active_dca_principals()?;
        if active == 0 {
            return Ok(());
        }

        let now = now_ms();
        let mut state = self
            .db
            .get_scheduler_state()?
            .unwrap_or_else(|| SchedulerState::new(self.interval_ms, now));
        state.interval_ms = self.interval_ms;
        state.running = true;
        self.db.put_scheduler_state(&state)?;
        self.running.store(true, Ordering::SeqCst);
        self.notify(SchedulerEvent::Started { now_ms: now });

        self.run_catchup(&mut state, now).await;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop().await });
        *self.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Cancels the pending timer and flips to not-running (spec.md §4.5
    /// `stop`).
    pub fn stop(&self) -> Result<(), CustodiaError> {
        if !self.is_running() {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(mut state) = self.db.get_scheduler_state()? {
            state.running = false;
            self.db.put_scheduler_state(&state)?;
        }
        self.notify(SchedulerEvent::Stopped { now_ms: now_ms() });
        Ok(())
    }

    /// Idempotently transitions running <-> stopped based on the current
    /// active-principal count (spec.md §4.5 `onUserStatusChanged`).
    pub async fn on_user_status_changed(self: &Arc<Self>) -> Result<(), CustodiaError> {
        let active = self.db.count_active_dca_principals()?;
        match (active == 0, self.is_running()) {
            (true, true) => self.stop(),
            (false, false) => self.start().await,
            _ => Ok(()),
        }
    }

    /// Run `min(missed, MAX_CATCHUP)` synthetic ticks in sequence at
    /// `lastRunAt + i*interval`; a failing tick aborts further catch-up
    /// without advancing `lastRunAt` past the last successful tick
    /// (P7, seed scenario 3).
    async fn run_catchup(&self, state: &mut SchedulerState, now: TimestampMs) {
        let missed = state.missed_intervals(now).min(MAX_CATCHUP);
        let base = state.last_run_at.unwrap_or(now);

        for i in 1..=missed {
            let synthetic_ts = base + (i as i64) * self.interval_ms;
            match self.tick(synthetic_ts).await {
                Ok(summary) => {
                    state.last_run_at = Some(synthetic_ts);
                    state.updated_at = synthetic_ts;
                    if let Err(e) = self.db.put_scheduler_state(state) {
                        tracing::error!(error = %e, "failed to persist scheduler state after catch-up tick");
                        break;
                    }
                    self.notify(SchedulerEvent::TickCompleted {
                        tick_ts: synthetic_ts,
                        purchased: summary.purchased,
                        skipped: summary.skipped,
                        failed: summary.failed,
                    });
                }
                Err(_) => {
                    self.notify(SchedulerEvent::TickFailed { tick_ts: synthetic_ts });
                    break;
                }
            }
        }
    }

    /// The steady-state loop: sleep until the next scheduled tick (derived
    /// from the last persisted `lastRunAt`, never from wall-clock drift),
    /// run it, and re-arm. On tick failure, re-arms after a bounded retry
    /// delay instead of the nominal interval, without advancing
    /// `lastRunAt` (spec.md §4.5).
    async fn run_loop(self: Arc<Self>) {
        loop {
            if !self.is_running() {
                return;
            }
            let state = match self.db.get_scheduler_state() {
                Ok(Some(s)) => s,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load scheduler state, stopping");
                    return;
                }
            };

            let now = now_ms();
            let last = state.last_run_at.unwrap_or(now);
            let next_tick_at = last + self.interval_ms;
            let delay_ms = (next_tick_at - now).max(0) as u64;
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

            if !self.is_running() {
                return;
            }

            let tick_ts = now_ms();
            match self.tick(tick_ts).await {
                Ok(summary) => {
                    if let Ok(Some(mut s)) = self.db.get_scheduler_state() {
                        s.last_run_at = Some(tick_ts);
                        s.updated_at = tick_ts;
                        let _ = self.db.put_scheduler_state(&s);
                    }
                    self.notify(SchedulerEvent::TickCompleted {
                        tick_ts,
                        purchased: summary.purchased,
                        skipped: summary.skipped,
                        failed: summary.failed,
                    });
                }
                Err(_) => {
                    self.notify(SchedulerEvent::TickFailed { tick_ts });
                    tokio::time::sleep(std::time::Duration::from_millis(SCHEDULER_RETRY_DELAY_MS)).await;
                }
            }
        }
    }

    /// Execute one tick: attempt a DCA purchase for every active
    /// principal. Per-principal failures (insufficient balance, quote
    /// error) are counted, not propagated — only a failure to even
    /// enumerate the active set fails the tick.
    async fn tick(&self, tick_ts: TimestampMs) -> Result<TickSummary, CustodiaError> {
        let principals = self.db.iter_dca_active_principals()?;
        let mut summary = TickSummary::default();

        for principal in principals {
            match self.executor.execute_dca_purchase(&principal, tick_ts).await {
                DcaOutcome::Purchased { .. } => summary.purchased += 1,
                DcaOutcome::InsufficientBalance => summary.skipped += 1,
                DcaOutcome::Failed { reason } => {
                    tracing::warn!(principal = %principal.id, reason, "DCA purchase failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use custodia_core::principal::Principal;
    use custodia_core::types::PrincipalId;
    use std::sync::atomic::AtomicUsize;

    struct CountingExecutor {
        calls: AtomicUsize,
        fail_on_tick_ts: Option<TimestampMs>,
    }

    #[async_trait]
    impl DcaExecutor for CountingExecutor {
        async fn execute_dca_purchase(&self, _principal: &Principal, tick_ts: TimestampMs) -> DcaOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(tick_ts) == self.fail_on_tick_ts {
                DcaOutcome::Failed {
                    reason: "simulated".into(),
                }
            } else {
                DcaOutcome::Purchased {
                    base_amount: 1,
                    transaction_id: "t".into(),
                }
            }
        }
    }

    fn make_db_with_one_active_principal() -> Arc<CustodiaDb> {
        let db = Arc::new(CustodiaDb::open_temporary().unwrap());
        let mut p = Principal::new(PrincipalId::new("1"), 0);
        p.dca_enabled = true;
        db.put_principal(&p).unwrap();
        db
    }

    /// Seed scenario 3 (spec.md §8): intervalMs=60000, lastRunAt=t,
    /// now=t+190000 -> three synthetic ticks at t+60k/120k/180k.
    #[tokio::test]
    async fn seed_scenario_catchup_runs_three_synthetic_ticks() {
        let db = make_db_with_one_active_principal();
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail_on_tick_ts: None,
        });
        let scheduler = DcaScheduler::new(db.clone(), executor.clone(), 60_000);

        let t = 1_000_000i64;
        db.put_scheduler_state(&SchedulerState {
            interval_ms: 60_000,
            last_run_at: Some(t),
            running: false,
            updated_at: t,
        })
        .unwrap();

        let mut state = db.get_scheduler_state().unwrap().unwrap();
        scheduler.run_catchup(&mut state, t + 190_000).await;

        assert_eq!(state.last_run_at, Some(t + 180_000));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    /// P7: a failing catch-up tick aborts further catch-up and does not
    /// advance `lastRunAt` past the last successful tick.
    #[tokio::test]
    async fn failed_catchup_tick_halts_without_advancing() {
        let db = make_db_with_one_active_principal();
        let t = 0i64;
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail_on_tick_ts: Some(t + 120_000),
        });
        let scheduler = DcaScheduler::new(db.clone(), executor.clone(), 60_000);

        db.put_scheduler_state(&SchedulerState {
            interval_ms: 60_000,
            last_run_at: Some(t),
            running: false,
            updated_at: t,
        })
        .unwrap();
        let mut state = db.get_scheduler_state().unwrap().unwrap();
        scheduler.run_catchup(&mut state, t + 190_000).await;

        assert_eq!(state.last_run_at, Some(t + 60_000));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn catchup_caps_at_max_catchup() {
        let db = make_db_with_one_active_principal();
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail_on_tick_ts: None,
        });
        let scheduler = DcaScheduler::new(db.clone(), executor.clone(), 1_000);

        let t = 0i64;
        db.put_scheduler_state(&SchedulerState {
            interval_ms: 1_000,
            last_run_at: Some(t),
            running: false,
            updated_at: t,
        })
        .unwrap();
        let mut state = db.get_scheduler_state().unwrap().unwrap();
        // 500 missed intervals; capped at MAX_CATCHUP = 100.
        scheduler.run_catchup(&mut state, t + 500_000).await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), MAX_CATCHUP as usize);
        assert_eq!(state.last_run_at, Some(t + (MAX_CATCHUP as i64) * 1_000));
    }

    #[tokio::test]
    async fn start_is_noop_with_no_active_principals() {
        let db = Arc::new(CustodiaDb::open_temporary().unwrap());
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail_on_tick_ts: None,
        });
        let scheduler = DcaScheduler::new(db, executor, 60_000);
        scheduler.start().await.unwrap();
        assert!(!scheduler.is_running());
    }
}
