//! Retry-level worker: a timer-driven loop bound to one retry tier.
//!
//! Each worker claims at most one row per tick and never processes rows
//! concurrently; serializing per worker caps the pool's database fan-out
//! at the roster size. The worker id is a log-only label; correctness
//! derives entirely from row locks.

use std::{sync::Arc, time::Duration};

use conveyor_core::{global_metrics, Clock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::processor::AttemptProcessor;

/// A worker dedicated to a single retry tier.
pub struct RetryWorker {
    id: String,
    tier: i32,
    poll_interval: Duration,
    processor: Arc<AttemptProcessor>,
    clock: Arc<dyn Clock>,
    cancellation: CancellationToken,
}

impl RetryWorker {
    /// Creates a new worker for the given tier and poll cadence.
    ///
    /// The id is `retry-<tier>-<8-hex>` with a fresh random suffix. It is
    /// never persisted and plays no role in claims.
    pub fn new(
        tier: i32,
        poll_interval: Duration,
        processor: Arc<AttemptProcessor>,
        clock: Arc<dyn Clock>,
        cancellation: CancellationToken,
    ) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

        Self {
            id: format!("retry-{tier}-{suffix}"),
            tier,
            poll_interval,
            processor,
            clock,
            cancellation,
        }
    }

    /// Returns the worker id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the retry tier this worker handles.
    pub fn tier(&self) -> i32 {
        self.tier
    }

    /// Main worker loop: one poll tick, at most one row, until cancelled.
    ///
    /// On cancellation the loop exits after any in-flight attempt returns,
    /// bounded by the HTTP client timeout plus one database round-trip.
    pub async fn run(&self) {
        info!(
            worker_id = %self.id,
            tier = self.tier,
            poll_interval_ms = self.poll_interval.as_millis(),
            "retry worker starting"
        );

        loop {
            if self.cancellation.is_cancelled() {
                break;
            }

            tokio::select! {
                () = self.cancellation.cancelled() => break,
                () = self.clock.sleep(self.poll_interval) => {
                    self.process_next().await;
                },
            }
        }

        info!(worker_id = %self.id, tier = self.tier, "retry worker stopped");
    }

    /// Claims and processes the next eligible row for this worker's tier.
    async fn process_next(&self) {
        let mut row = match self.processor.claim(self.tier).await {
            Ok(Some(row)) => row,
            Ok(None) => return, // no work for this tier, normal
            Err(e) => {
                global_metrics().record_claim_error();
                error!(
                    worker_id = %self.id,
                    tier = self.tier,
                    error = %e,
                    "failed to claim next webhook"
                );
                return;
            },
        };

        if let Err(e) = self.processor.process(&mut row, &self.id, &self.cancellation).await {
            error!(
                worker_id = %self.id,
                tier = self.tier,
                queue_id = %row.queue_id,
                error = %e,
                "failed to process webhook"
            );

            // Release the claim so another worker can retake the row.
            if let Err(reset_err) = self.processor.reset_to_pending(&row).await {
                error!(
                    worker_id = %self.id,
                    queue_id = %row.queue_id,
                    error = %reset_err,
                    "failed to reset webhook to pending"
                );
            }
        }
    }
}
