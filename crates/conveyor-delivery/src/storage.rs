//! Storage abstraction for the delivery engine.
//!
//! The processor and workers depend on this trait rather than on the
//! concrete repositories, so delivery logic (classification, backoff,
//! terminal transitions, recovery) is testable without a database.
//! Production uses [`PostgresQueueStore`]; tests use the in-memory mock.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use conveyor_core::{
    error::Result,
    models::{AttemptRecord, QueueRowUpdate, WebhookQueueRow},
    storage::Storage,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Queue operations required by the delivery engine.
pub trait QueueStore: Send + Sync + 'static {
    /// Atomically claims the next eligible PENDING row at a retry tier,
    /// transitioning it to PROCESSING. Returns `None` when no row is
    /// eligible. Never returns a row on error.
    fn claim_next(&self, tier: i32) -> BoxFuture<'_, Result<Option<WebhookQueueRow>>>;

    /// Writes the tier-k attempt slot and mirrors the summary fields.
    fn record_attempt(
        &self,
        id: i64,
        tier: i32,
        record: AttemptRecord,
    ) -> BoxFuture<'_, Result<()>>;

    /// Marks a row COMPLETED, recording when its final attempt started.
    fn mark_completed(
        &self,
        id: i64,
        processing_started_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Marks a row permanently FAILED with the given error message.
    fn mark_failed(&self, id: i64, error_msg: String) -> BoxFuture<'_, Result<()>>;

    /// Applies a partial update; absent fields never overwrite stored state.
    fn update(&self, id: i64, update: QueueRowUpdate) -> BoxFuture<'_, Result<()>>;
}

/// Production store backed by the PostgreSQL repositories.
pub struct PostgresQueueStore {
    storage: Arc<Storage>,
}

impl PostgresQueueStore {
    /// Creates a new PostgreSQL store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl QueueStore for PostgresQueueStore {
    fn claim_next(&self, tier: i32) -> BoxFuture<'_, Result<Option<WebhookQueueRow>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_queue.claim_next(tier).await })
    }

    fn record_attempt(
        &self,
        id: i64,
        tier: i32,
        record: AttemptRecord,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_queue.record_attempt(id, tier, &record).await })
    }

    fn mark_completed(
        &self,
        id: i64,
        processing_started_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_queue.mark_completed(id, processing_started_at).await })
    }

    fn mark_failed(&self, id: i64, error_msg: String) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_queue.mark_failed(id, &error_msg).await })
    }

    fn update(&self, id: i64, update: QueueRowUpdate) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_queue.update(id, &update).await })
    }
}

pub mod mock {
    //! In-memory queue store for testing delivery logic without a database.
    //!
    //! Mirrors the repository's claim semantics: tier and eligibility
    //! filtering, oldest-eligibility-first ordering, PROCESSING transition
    //! on claim. Supports error injection for storage-failure paths.

    use std::collections::BTreeMap;

    use conveyor_core::{
        error::CoreError,
        models::{AttemptSlot, WebhookStatus},
    };
    use tokio::sync::RwLock;

    use super::{
        Arc, AttemptRecord, BoxFuture, DateTime, QueueRowUpdate, QueueStore, Result, Utc,
        WebhookQueueRow,
    };

    /// Mock queue store holding rows in memory.
    #[derive(Default)]
    pub struct InMemoryQueueStore {
        rows: Arc<RwLock<BTreeMap<i64, WebhookQueueRow>>>,
        next_id: Arc<RwLock<i64>>,
        claim_error: Arc<RwLock<Option<String>>>,
        record_error: Arc<RwLock<Option<String>>>,
        terminal_error: Arc<RwLock<Option<String>>>,
    }

    impl InMemoryQueueStore {
        /// Creates a new empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Inserts a row, assigning the next internal id. Returns the id.
        pub async fn insert_row(&self, mut row: WebhookQueueRow) -> i64 {
            let mut next_id = self.next_id.write().await;
            *next_id += 1;
            row.id = *next_id;
            let id = row.id;
            self.rows.write().await.insert(id, row);
            id
        }

        /// Returns a snapshot of a row.
        pub async fn row(&self, id: i64) -> Option<WebhookQueueRow> {
            self.rows.read().await.get(&id).cloned()
        }

        /// Returns a row's current status.
        pub async fn status_of(&self, id: i64) -> Option<WebhookStatus> {
            self.rows.read().await.get(&id).map(|r| r.status)
        }

        /// Returns a row's tier-k attempt slot.
        pub async fn attempt(&self, id: i64, tier: i32) -> Option<AttemptSlot> {
            self.rows.read().await.get(&id).and_then(|r| r.attempt(tier)).cloned()
        }

        /// Makes a row eligible for claiming right now.
        pub async fn make_eligible(&self, id: i64) {
            if let Some(row) = self.rows.write().await.get_mut(&id) {
                row.next_retry_at = Utc::now() - chrono::Duration::seconds(1);
            }
        }

        /// Injects an error for the next claim call.
        pub async fn inject_claim_error(&self, message: impl Into<String>) {
            *self.claim_error.write().await = Some(message.into());
        }

        /// Injects an error for the next `record_attempt` call.
        pub async fn inject_record_error(&self, message: impl Into<String>) {
            *self.record_error.write().await = Some(message.into());
        }

        /// Injects an error for the next terminal write
        /// (`mark_completed` / `mark_failed`).
        pub async fn inject_terminal_error(&self, message: impl Into<String>) {
            *self.terminal_error.write().await = Some(message.into());
        }
    }

    impl QueueStore for InMemoryQueueStore {
        fn claim_next(&self, tier: i32) -> BoxFuture<'_, Result<Option<WebhookQueueRow>>> {
            Box::pin(async move {
                if let Some(message) = self.claim_error.write().await.take() {
                    return Err(CoreError::Database(message));
                }

                let now = Utc::now();
                let mut rows = self.rows.write().await;

                let candidate = rows
                    .values()
                    .filter(|r| {
                        r.status == WebhookStatus::Pending
                            && r.retry_count == tier
                            && r.next_retry_at <= now
                            && r.deleted_at.is_none()
                    })
                    .min_by_key(|r| (r.next_retry_at, r.id))
                    .map(|r| r.id);

                let claimed = candidate.and_then(|id| rows.get_mut(&id)).map(|row| {
                    row.status = WebhookStatus::Processing;
                    row.updated_at = now;
                    row.clone()
                });

                Ok(claimed)
            })
        }

        fn record_attempt(
            &self,
            id: i64,
            tier: i32,
            record: AttemptRecord,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(message) = self.record_error.write().await.take() {
                    return Err(CoreError::Database(message));
                }

                let slot_index = usize::try_from(tier)
                    .map_err(|_| CoreError::InvalidInput(format!("retry tier: {tier}")))?;

                let mut rows = self.rows.write().await;
                let row = rows
                    .get_mut(&id)
                    .ok_or_else(|| CoreError::NotFound(format!("queue row {id}")))?;

                let slot = row
                    .attempts
                    .get_mut(slot_index)
                    .ok_or_else(|| CoreError::InvalidInput(format!("retry tier: {tier}")))?;
                *slot = AttemptSlot {
                    started_at: Some(record.started_at),
                    completed_at: record.completed_at,
                    duration_ms: Some(record.duration_ms),
                    http_status: record.http_status,
                    response_body: Some(record.response_body),
                    error: record.error.clone(),
                };

                row.last_http_status = record.http_status;
                if record.error.is_some() {
                    row.last_error = record.error;
                }
                row.updated_at = Utc::now();

                Ok(())
            })
        }

        fn mark_completed(
            &self,
            id: i64,
            processing_started_at: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(message) = self.terminal_error.write().await.take() {
                    return Err(CoreError::Database(message));
                }

                let mut rows = self.rows.write().await;
                let row = rows
                    .get_mut(&id)
                    .ok_or_else(|| CoreError::NotFound(format!("queue row {id}")))?;

                let now = Utc::now();
                row.status = WebhookStatus::Completed;
                row.processing_started_at = Some(processing_started_at);
                row.completed_at = Some(now);
                row.updated_at = now;

                Ok(())
            })
        }

        fn mark_failed(&self, id: i64, error_msg: String) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(message) = self.terminal_error.write().await.take() {
                    return Err(CoreError::Database(message));
                }

                let mut rows = self.rows.write().await;
                let row = rows
                    .get_mut(&id)
                    .ok_or_else(|| CoreError::NotFound(format!("queue row {id}")))?;

                row.status = WebhookStatus::Failed;
                row.last_error = Some(error_msg);
                row.updated_at = Utc::now();

                Ok(())
            })
        }

        fn update(&self, id: i64, update: QueueRowUpdate) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                let mut rows = self.rows.write().await;
                let row = rows
                    .get_mut(&id)
                    .ok_or_else(|| CoreError::NotFound(format!("queue row {id}")))?;

                if let Some(status) = update.status {
                    row.status = status;
                }
                if let Some(retry_count) = update.retry_count {
                    row.retry_count = retry_count;
                }
                if let Some(next_retry_at) = update.next_retry_at {
                    row.next_retry_at = next_retry_at;
                }
                if let Some(last_error) = update.last_error {
                    row.last_error = Some(last_error);
                }
                if let Some(last_http_status) = update.last_http_status {
                    row.last_http_status = Some(last_http_status);
                }
                if let Some(updated_at) = update.updated_at {
                    row.updated_at = updated_at;
                }
                if let Some(processing_started_at) = update.processing_started_at {
                    row.processing_started_at = Some(processing_started_at);
                }
                if let Some(completed_at) = update.completed_at {
                    row.completed_at = Some(completed_at);
                }
                if let Some(deleted_at) = update.deleted_at {
                    row.deleted_at = Some(deleted_at);
                }

                Ok(())
            })
        }
    }
}
