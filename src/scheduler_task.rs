//! Scheduler loop driving the pipeline
//!
//! The loop runs the job once at startup, then wakes up every poll interval to ask
//! the [`Scheduler`] whether the daily trigger is due. Runs are awaited inline, so
//! two runs never overlap. Cancellation is only observed while idle: a run that has
//! started always finishes.
//!
//! ```text
//! Starting ──▶ Executing ──▶ Idle ⇄ Executing
//!                              │
//!                         cancelled
//!                              ▼
//!                          Stopping ──▶ Stopped
//! ```
//!
//! # Example
//!
//! ```no_run
//! use certpost::config::ScheduleConfig;
//! use certpost::scheduler::Scheduler;
//! use certpost::scheduler_task::{ScheduledJob, SchedulerLoop};
//! use certpost::types::RunSummary;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl ScheduledJob for Hello {
//!     async fn execute(&self) -> RunSummary {
//!         println!("hello");
//!         RunSummary::default()
//!     }
//! }
//!
//! # async fn example() {
//! let config = ScheduleConfig::default();
//! let scheduler = Scheduler::new(config.trigger(), chrono::Local::now());
//! let cancel = CancellationToken::new();
//!
//! let report = SchedulerLoop::new(Arc::new(Hello), scheduler, &config, cancel)
//!     .run()
//!     .await;
//! println!("{} runs", report.runs);
//! # }
//! ```

use crate::config::ScheduleConfig;
use crate::scheduler::Scheduler;
use crate::types::RunSummary;
use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work executed on every trigger
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Run once; failures are reported through the summary, never by panicking
    async fn execute(&self) -> RunSummary;
}

/// Lifecycle of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, startup run pending
    Starting,
    /// Waiting for the next trigger
    Idle,
    /// A run is in progress
    Executing,
    /// Cancellation observed, winding down
    Stopping,
    /// Loop has returned
    Stopped,
}

/// What the loop did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Number of completed runs
    pub runs: usize,
    /// Summary of the last run, if any
    pub last: Option<RunSummary>,
}

/// Single-threaded cooperative scheduler loop
pub struct SchedulerLoop {
    job: Arc<dyn ScheduledJob>,
    scheduler: Scheduler,
    run_at_startup: bool,
    poll_interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<LoopState>,
}

impl SchedulerLoop {
    /// Create a loop for `job`, stopped by `cancel`
    pub fn new(
        job: Arc<dyn ScheduledJob>,
        scheduler: Scheduler,
        config: &ScheduleConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Starting);
        Self {
            job,
            scheduler,
            run_at_startup: config.run_at_startup,
            poll_interval: config.poll_interval,
            cancel,
            state,
        }
    }

    /// Follow state transitions
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Run until cancelled
    pub async fn run(mut self) -> LoopReport {
        let mut report = LoopReport::default();
        info!(
            next_due = ?self.scheduler.next_due(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "scheduler loop started"
        );

        if self.run_at_startup && !self.cancel.is_cancelled() {
            self.execute(&mut report).await;
        }

        loop {
            self.set_state(LoopState::Idle);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.poll_interval) => {}
            }

            if self.scheduler.poll(Local::now()) {
                self.execute(&mut report).await;
            }
        }

        self.set_state(LoopState::Stopping);
        info!(runs = report.runs, "scheduler loop stopping");
        self.set_state(LoopState::Stopped);
        report
    }

    async fn execute(&mut self, report: &mut LoopReport) {
        self.set_state(LoopState::Executing);
        let summary = self.job.execute().await;
        report.runs += 1;

        if summary.is_clean() {
            info!(run = report.runs, ?summary, "run finished");
        } else {
            warn!(run = report.runs, ?summary, "run finished with failures");
        }
        if let Some(next) = self.scheduler.next_due() {
            debug!(next_due = %next, "next scheduled run");
        }

        report.last = Some(summary);
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }
}
