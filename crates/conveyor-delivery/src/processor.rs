//! The attempt processor: one full delivery attempt for one claimed row.
//!
//! Pipeline: claim → send → classify → persist the attempt slot →
//! complete, reschedule, or fail permanently. Attempt-level failures never
//! propagate to the worker; only storage failures on the state transition
//! do, so the worker can release the claimed row.

use std::sync::Arc;

use chrono::Utc;
use conveyor_core::{
    global_metrics,
    models::{AttemptRecord, QueueRowUpdate, WebhookQueueRow, WebhookStatus},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::{DispatchClient, DispatchResponse},
    error::{DeliveryError, Result},
    retry,
    storage::QueueStore,
};

/// Runs one full delivery attempt against a claimed queue row.
pub struct AttemptProcessor {
    store: Arc<dyn QueueStore>,
    client: Arc<DispatchClient>,
}

impl AttemptProcessor {
    /// Creates a new processor over the given store and dispatch client.
    pub fn new(store: Arc<dyn QueueStore>, client: Arc<DispatchClient>) -> Self {
        Self { store, client }
    }

    /// Claims the next eligible row at a tier.
    ///
    /// # Errors
    ///
    /// Returns error if the claim transaction fails. A failed claim never
    /// yields a row.
    pub async fn claim(&self, tier: i32) -> Result<Option<WebhookQueueRow>> {
        Ok(self.store.claim_next(tier).await?)
    }

    /// Executes one attempt for a claimed row.
    ///
    /// Records the tier slot, mirrors the summary fields on the in-memory
    /// row, and transitions the row: COMPLETED on 2xx, rescheduled PENDING
    /// on failure below tier 6, FAILED on the final tier. A failure to
    /// record the attempt slot is logged and swallowed; a failure on the
    /// state transition bubbles up so the caller can release the row.
    ///
    /// # Errors
    ///
    /// Returns error only when the terminal or reschedule write fails.
    pub async fn process(
        &self,
        row: &mut WebhookQueueRow,
        worker_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(
            queue_id = %row.queue_id,
            worker_id,
            retry_count = row.retry_count,
            "processing webhook"
        );

        let tier = row.retry_count;
        let started_at = Utc::now();

        // Cancellation during the in-flight call is recorded as a transport
        // error and takes the normal failure path.
        let outcome = tokio::select! {
            result = self.client.send(row) => result,
            () = cancel.cancelled() => Err(DeliveryError::Cancelled),
        };

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        let (http_status, response_body) = match &outcome {
            Ok(response) => (Some(i32::from(response.status_code)), response.body.clone()),
            Err(_) => (None, String::new()),
        };

        let error_msg = match &outcome {
            Err(e) => Some(e.to_string()),
            Ok(response) if !response.is_success() => {
                Some(format!("HTTP {}: {}", response.status_code, reason_phrase(response)))
            },
            Ok(_) => None,
        };

        let record = AttemptRecord {
            started_at,
            completed_at: Some(completed_at),
            duration_ms,
            http_status,
            response_body,
            error: error_msg.clone(),
        };

        if let Err(e) = self.store.record_attempt(row.id, tier, record).await {
            // History loss is tolerated; blocking the state transition is not.
            warn!(queue_id = %row.queue_id, error = %e, "failed to record attempt");
        }

        row.last_http_status = http_status;
        if let Some(msg) = &error_msg {
            row.last_error = Some(msg.clone());
        }

        let succeeded = error_msg.is_none();
        global_metrics().record_attempt(
            tier,
            succeeded,
            (completed_at - started_at).to_std().unwrap_or_default(),
        );

        if succeeded {
            self.store.mark_completed(row.id, started_at).await?;
            row.status = WebhookStatus::Completed;

            info!(
                queue_id = %row.queue_id,
                status_code = http_status.unwrap_or_default(),
                retry_count = row.retry_count,
                "webhook completed successfully"
            );
            return Ok(());
        }

        if row.can_retry() {
            let now = Utc::now();
            let next = retry::next_retry_at(row.retry_count, now);

            row.retry_count += 1;
            row.next_retry_at = next;
            row.status = WebhookStatus::Pending;
            row.updated_at = now;

            self.store
                .update(row.id, QueueRowUpdate {
                    status: Some(WebhookStatus::Pending),
                    retry_count: Some(row.retry_count),
                    next_retry_at: Some(next),
                    updated_at: Some(now),
                    ..Default::default()
                })
                .await?;

            info!(
                queue_id = %row.queue_id,
                retry_count = row.retry_count,
                next_retry_at = %next,
                "webhook scheduled for retry"
            );
            return Ok(());
        }

        let reason = match &outcome {
            Err(e) => e.to_string(),
            Ok(response) => format!("HTTP {}", response.status_code),
        };
        let final_error = format!("max retries exceeded: {reason}");

        self.store.mark_failed(row.id, final_error.clone()).await?;
        row.status = WebhookStatus::Failed;
        row.last_error = Some(final_error.clone());
        global_metrics().record_exhausted();

        error!(queue_id = %row.queue_id, error = %final_error, "webhook permanently failed");

        Ok(())
    }

    /// Releases a row stuck in PROCESSING back to PENDING.
    ///
    /// Best-effort recovery after a processor-level error, so another claim
    /// can retake the row. Touches only status and the modification
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn reset_to_pending(&self, row: &WebhookQueueRow) -> Result<()> {
        self.store
            .update(row.id, QueueRowUpdate {
                status: Some(WebhookStatus::Pending),
                updated_at: Some(Utc::now()),
                ..Default::default()
            })
            .await?;

        Ok(())
    }
}

/// Canonical reason phrase for a status code, empty for unknown codes.
fn reason_phrase(response: &DispatchResponse) -> &'static str {
    reqwest::StatusCode::from_u16(response.status_code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or_default()
}
