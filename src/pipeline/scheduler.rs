//! Poll scheduler
//!
//! State machine driving the pipeline:
//!
//! ```text
//! Idle -> Fetching -> Processing -> Sleeping -> Idle
//!            \            \
//!             +------------+--> ErrorRecovery -> Idle
//! ```
//!
//! A failed (or panicking) cycle waits the error cooldown instead of the
//! poll interval. Cancellation abandons the current wait; an in-flight cycle
//! is always allowed to finish.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::CycleReport;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Processing,
    Sleeping,
    ErrorRecovery,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Fetching => "fetching",
            SchedulerState::Processing => "processing",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::ErrorRecovery => "error_recovery",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Publishes scheduler state to watchers
#[derive(Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<SchedulerState>>,
}

impl StateHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(SchedulerState::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: SchedulerState) {
        self.tx.send_replace(state);
    }

    pub fn get(&self) -> SchedulerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.tx.subscribe()
    }
}

/// One unit of scheduled work
#[async_trait]
pub trait PollCycle: Send + Sync {
    /// Run a cycle. The scheduler has already moved to `Fetching`;
    /// implementations may report `Processing` once the fetch is done.
    async fn poll(&self, state: &StateHandle) -> Result<CycleReport>;
}

/// Counters returned when the scheduler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub failures: u64,
}

pub struct Scheduler {
    cycle: Arc<dyn PollCycle>,
    poll_interval: Duration,
    error_cooldown: Duration,
    state: StateHandle,
}

impl Scheduler {
    pub fn new(cycle: Arc<dyn PollCycle>, poll_interval: Duration, error_cooldown: Duration) -> Self {
        Self {
            cycle,
            poll_interval,
            error_cooldown,
            state: StateHandle::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Loop until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerSummary {
        let mut summary = SchedulerSummary::default();

        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            error_cooldown_secs = self.error_cooldown.as_secs(),
            "Scheduler started"
        );

        while !cancel.is_cancelled() {
            self.state.set(SchedulerState::Idle);
            self.state.set(SchedulerState::Fetching);

            let span = info_span!("cycle", id = %Uuid::new_v4(), n = summary.cycles + 1);
            let result = self.run_one().instrument(span).await;
            summary.cycles += 1;

            let wait = match result {
                Ok(_) => {
                    self.state.set(SchedulerState::Sleeping);
                    self.poll_interval
                }
                Err(e) => {
                    summary.failures += 1;
                    error!(
                        error = %e,
                        cooldown_secs = self.error_cooldown.as_secs(),
                        "Cycle failed, entering error recovery"
                    );
                    self.state.set(SchedulerState::ErrorRecovery);
                    self.error_cooldown
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.state.set(SchedulerState::Stopped);
        info!(cycles = summary.cycles, failures = summary.failures, "Scheduler stopped");
        summary
    }

    async fn run_one(&self) -> Result<CycleReport> {
        match AssertUnwindSafe(self.cycle.poll(&self.state)).catch_unwind().await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e @ Error::CycleFailure(_))) => Err(e),
            Ok(Err(other)) => Err(Error::CycleFailure(other.to_string())),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(Error::CycleFailure(format!("cycle panicked: {}", reason)))
            }
        }
    }
}
