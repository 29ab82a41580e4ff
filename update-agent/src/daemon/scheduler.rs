//! Periodic update checks on a background task.
//!
//! The scheduler owns the orchestrator, so at most one cycle is ever in
//! flight. A cycle always runs to its terminal state; cancellation is only
//! observed between cycles.

use crate::executor::{UpdateOrchestrator, UpdateOutcome};
use semver::Version;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the scheduler loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerExit {
    /// An update was applied and the restart hook has run.
    RestartRequested(Version),
    Cancelled,
}

pub struct Scheduler {
    orchestrator: UpdateOrchestrator,
    interval: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: UpdateOrchestrator, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Spawn the loop onto the runtime.
    ///
    /// `on_restart` is called once, after a successful update, before the
    /// task finishes.
    pub fn start<F>(self, on_restart: F, cancel: CancellationToken) -> JoinHandle<SchedulerExit>
    where
        F: FnOnce() + Send + 'static,
    {
        tokio::spawn(self.run(on_restart, cancel))
    }

    pub async fn run<F>(mut self, on_restart: F, cancel: CancellationToken) -> SchedulerExit
    where
        F: FnOnce(),
    {
        info!(
            interval_secs = self.interval.as_secs(),
            version = %self.orchestrator.current_version(),
            "Update scheduler started"
        );
        let mut cycle: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            cycle += 1;
            debug!(cycle, "Starting update cycle");

            match self.orchestrator.run_cycle().await {
                UpdateOutcome::Applied(version) => {
                    info!(cycle, version = %version, "Update applied, invoking restart hook");
                    on_restart();
                    return SchedulerExit::RestartRequested(version);
                }
                UpdateOutcome::NoUpdateAvailable => {
                    debug!(cycle, "No update available");
                }
                UpdateOutcome::Failed(e) if e.is_fatal() => {
                    error!(
                        cycle,
                        error_kind = e.kind(),
                        error = %e,
                        state = %self.orchestrator.last_state(),
                        "Update cycle failed, installation needs manual attention"
                    );
                }
                UpdateOutcome::Failed(e) => {
                    warn!(
                        cycle,
                        error_kind = e.kind(),
                        error = %e,
                        "Update cycle failed, retrying next interval"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles = cycle, "Update scheduler stopped");
        SchedulerExit::Cancelled
    }
}
