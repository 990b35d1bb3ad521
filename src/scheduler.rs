//! Cadence-driven task scheduler.
//!
//! Every periodic task is plain data (a label, a [`Cadence`] and a task
//! closure) driven by its own loop on the tokio runtime.  A loop
//! awaits its task before arming the next tick, so a task never overlaps
//! itself; ticks missed while it ran are skipped, never queued.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Scheduler                             │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────┐               │
//! │  │FixedDelay │  │ FixedRate │  │EveryMinutes │  one loop     │
//! │  │ sleep→run │  │ interval  │  │ wall clock  │  per task     │
//! │  └─────┬─────┘  └─────┬─────┘  └──────┬──────┘               │
//! │        └──────────────┼───────────────┘                      │
//! │                       ▼                                      │
//! │        task() ── Err ──▶ error!("{:#}") and keep going       │
//! │                                                              │
//! │  Worker: single slot for long actuation sequences;           │
//! │          try_run() skips when the slot is taken.             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, Timelike};
use log::{debug, error, info};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::app::ports::BoxFuture;

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// When a task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Wait `initial`, then run; after each run completes wait `period`.
    FixedDelay { initial: Duration, period: Duration },
    /// Fire on a fixed grid `initial + k·period`; late ticks are skipped.
    FixedRate { initial: Duration, period: Duration },
    /// Fire on local wall-clock multiples of `n` minutes from midnight
    /// (`15` → :00, :15, :30, :45).
    EveryMinutes(u32),
}

/// A single schedule entry.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// Human-readable label (e.g., "power-cycle").
    pub label: &'static str,
    pub cadence: Cadence,
}

impl Schedule {
    pub const fn new(label: &'static str, cadence: Cadence) -> Self {
        Self { label, cadence }
    }
}

/// Time from `now` to the next local-clock multiple of `minutes`.
/// Exactly on a boundary returns a full period.
pub fn until_next_boundary(now: NaiveTime, minutes: u32) -> Duration {
    let period = u64::from(minutes.max(1)) * 60;
    let into_period = u64::from(now.num_seconds_from_midnight()) % period;
    // Leap-second nanos (≥ 1e9) are clamped to the end of the second.
    let nanos = u64::from(now.nanosecond().min(999_999_999));
    Duration::from_secs(period) - Duration::from_secs(into_period) - Duration::from_nanos(nanos)
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

pub struct Scheduler {
    tasks: Vec<(Schedule, TaskFn)>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancel,
        }
    }

    /// Register a task.  Nothing runs until [`spawn`](Self::spawn).
    pub fn add<F, Fut>(&mut self, schedule: Schedule, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        info!("Scheduler: added '{}' ({:?})", schedule.label, schedule.cadence);
        let task: TaskFn = Arc::new(move || Box::pin(task()) as TaskFuture);
        self.tasks.push((schedule, task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start one loop per task.  Loops exit once the token is cancelled;
    /// a run in progress is allowed to finish first.
    pub fn spawn(self) -> JoinSet<()> {
        let mut set = JoinSet::new();
        for (schedule, task) in self.tasks {
            set.spawn(drive(schedule, task, self.cancel.clone()));
        }
        set
    }
}

/// Sleep unless cancelled first.  `false` means stop.
async fn pause(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(d) => true,
    }
}

async fn run_once(label: &str, task: &TaskFn) {
    debug!("Scheduler: '{}' fired", label);
    if let Err(e) = task().await {
        error!("Scheduler: '{}' failed: {:#}", label, e);
    }
}

async fn drive(schedule: Schedule, task: TaskFn, cancel: CancellationToken) {
    let label = schedule.label;
    match schedule.cadence {
        Cadence::FixedDelay { initial, period } => {
            if !pause(&cancel, initial).await {
                return;
            }
            loop {
                run_once(label, &task).await;
                if !pause(&cancel, period).await {
                    break;
                }
            }
        }
        Cadence::FixedRate { initial, period } => {
            let mut ticks = tokio::time::interval_at(Instant::now() + initial, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticks.tick() => run_once(label, &task).await,
                }
            }
        }
        Cadence::EveryMinutes(minutes) => loop {
            let wait = until_next_boundary(Local::now().time(), minutes);
            if !pause(&cancel, wait).await {
                break;
            }
            run_once(label, &task).await;
        },
    }
    debug!("Scheduler: '{}' stopped", label);
}

// ═══════════════════════════════════════════════════════════════
//  Single-slot worker
// ═══════════════════════════════════════════════════════════════

/// At most one long-running actuation job at a time.
#[derive(Debug, Clone, Default)]
pub struct Worker {
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` if the slot is free, otherwise skip it.
    pub async fn try_run<F: Future>(&self, label: &str, job: F) -> Option<F::Output> {
        let Ok(_busy) = self.slot.try_lock() else {
            debug!("Worker: busy, skipping '{}'", label);
            return None;
        };
        Some(job.await)
    }

    pub fn is_idle(&self) -> bool {
        self.slot.try_lock().is_ok()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
