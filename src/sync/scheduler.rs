//! Timer-driven invocation of sync cycles.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::orchestrator::SyncOrchestrator;
use crate::systemd::SystemdNotifier;

/// Default pause between the end of one cycle and the start of the next.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    once: bool,
    notifier: SystemdNotifier,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            once: false,
            notifier: SystemdNotifier::default(),
        }
    }

    /// Stop after a single cycle instead of looping.
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub(crate) fn with_notifier(mut self, notifier: SystemdNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run cycles until `shutdown` is cancelled (or after one cycle in
    /// `once` mode). Returns the number of cycles started.
    ///
    /// A cycle that cannot even list users is logged and retried after the
    /// normal interval; nothing here ends the loop except shutdown.
    pub async fn run(&self, orchestrator: &SyncOrchestrator, shutdown: CancellationToken) -> u64 {
        self.notifier.notify_ready();
        let mut cycles = 0u64;

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, exiting...");
                break;
            }

            cycles += 1;
            match orchestrator.run_cycle(&shutdown).await {
                Ok(report) => self.notifier.notify_status(&report.summary()),
                Err(e) => {
                    tracing::error!(cycle = cycles, error = %e, "Sync cycle aborted: could not list users");
                    self.notifier.notify_status("last cycle failed: store unavailable");
                }
            }

            if self.once {
                break;
            }

            tracing::info!("Next sync in {} seconds", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown during wait, exiting...");
                    break;
                }
            }
        }

        self.notifier.notify_stopping();
        cycles
    }
}
