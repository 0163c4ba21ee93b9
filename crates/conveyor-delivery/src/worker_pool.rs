//! Worker pool: lifecycle management for the fixed retry-tier roster.
//!
//! The pool is the only component aware of the roster; workers themselves
//! know nothing beyond their `(tier, period)`. Start and stop are guarded:
//! a second start and a stop on a non-running pool are errors.

use std::{sync::Arc, time::Duration};

use conveyor_core::{models::MAX_RETRY_COUNT, Clock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{DeliveryError, Result},
    processor::AttemptProcessor,
    worker::RetryWorker,
};

/// One roster entry: a worker bound to a retry tier with a poll cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Retry tier this worker claims (0..=6).
    pub tier: i32,
    /// How often the worker polls for an eligible row.
    pub poll_interval: Duration,
}

/// The default roster.
///
/// Three tier-0 workers parallelize the hot path; higher tiers need only
/// one worker each because eligibility is sparse there.
pub fn default_roster() -> Vec<WorkerSpec> {
    vec![
        WorkerSpec { tier: 0, poll_interval: Duration::from_secs(5) },
        WorkerSpec { tier: 0, poll_interval: Duration::from_secs(5) },
        WorkerSpec { tier: 0, poll_interval: Duration::from_secs(5) },
        WorkerSpec { tier: 1, poll_interval: Duration::from_secs(30) },
        WorkerSpec { tier: 2, poll_interval: Duration::from_secs(2 * 60) },
        WorkerSpec { tier: 3, poll_interval: Duration::from_secs(5 * 60) },
        WorkerSpec { tier: 4, poll_interval: Duration::from_secs(15 * 60) },
        WorkerSpec { tier: 5, poll_interval: Duration::from_secs(30 * 60) },
        WorkerSpec { tier: 6, poll_interval: Duration::from_secs(60 * 60) },
    ]
}

/// Pool of retry-tier workers with supervised lifecycle.
pub struct WorkerPool {
    processor: Arc<AttemptProcessor>,
    roster: Vec<WorkerSpec>,
    clock: Arc<dyn Clock>,
    cancellation: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

impl WorkerPool {
    /// Creates a new pool over the given roster.
    pub fn new(
        processor: Arc<AttemptProcessor>,
        roster: Vec<WorkerSpec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            processor,
            roster,
            clock,
            cancellation: CancellationToken::new(),
            handles: Vec::new(),
            running: false,
        }
    }

    /// Starts every worker in roster declaration order.
    ///
    /// If a worker cannot be started (invalid tier in the roster), workers
    /// started so far are stopped before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` on a second start, or a configuration error
    /// for an invalid roster entry.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(DeliveryError::AlreadyRunning);
        }

        info!(worker_count = self.roster.len(), "starting worker pool");

        self.cancellation = CancellationToken::new();

        for spec in self.roster.clone() {
            if !(0..=MAX_RETRY_COUNT).contains(&spec.tier) {
                let err = DeliveryError::configuration(format!(
                    "roster tier out of range: {}",
                    spec.tier
                ));
                self.stop_workers().await;
                return Err(err);
            }

            let worker = RetryWorker::new(
                spec.tier,
                spec.poll_interval,
                self.processor.clone(),
                self.clock.clone(),
                self.cancellation.clone(),
            );

            info!(
                worker_id = %worker.id(),
                tier = spec.tier,
                poll_interval_ms = spec.poll_interval.as_millis(),
                "worker started"
            );

            self.handles.push(tokio::spawn(async move { worker.run().await }));
        }

        self.running = true;
        info!(total_workers = self.handles.len(), "worker pool started successfully");

        Ok(())
    }

    /// Signals every worker to cancel and waits for all of them to exit.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when the pool is not running.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(DeliveryError::NotRunning);
        }

        info!("stopping worker pool");

        self.stop_workers().await;
        self.running = false;

        info!("worker pool stopped");

        Ok(())
    }

    /// Whether any worker task has not yet finished.
    pub fn has_active_workers(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    async fn stop_workers(&mut self) {
        self.cancellation.cancel();

        for handle in self.handles.drain(..) {
            if let Err(join_error) = handle.await {
                warn!(error = %join_error, "worker task panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.running && !self.cancellation.is_cancelled() {
            warn!(
                active_workers = self.handles.iter().filter(|h| !h.is_finished()).count(),
                "worker pool dropped while running, forcing cancellation"
            );
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_matches_tier_table() {
        let roster = default_roster();

        assert_eq!(roster.len(), 9);
        assert_eq!(roster.iter().filter(|s| s.tier == 0).count(), 3);
        for tier in 1..=6 {
            assert_eq!(roster.iter().filter(|s| s.tier == tier).count(), 1);
        }

        assert_eq!(roster[0].poll_interval, Duration::from_secs(5));
        assert_eq!(roster[3].poll_interval, Duration::from_secs(30));
        assert_eq!(roster[8].poll_interval, Duration::from_secs(3600));
    }
}
