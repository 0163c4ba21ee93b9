//! Repository for webhook queue row operations.
//!
//! Owns the atomic single-row claim (`FOR UPDATE SKIP LOCKED`), per-tier
//! attempt recording, terminal-state transitions, and the partial update
//! used to reschedule failed attempts.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{
        AttemptRecord, QueueId, QueueRowUpdate, WebhookQueueRow, WebhookStatus, ATTEMPT_SLOTS,
        MAX_RETRY_COUNT,
    },
};

/// Full column list for `webhook_queue`, shared by every query that decodes
/// a complete row.
fn row_columns() -> &'static str {
    static COLUMNS: OnceLock<String> = OnceLock::new();
    COLUMNS.get_or_init(|| {
        let mut cols = String::from(
            "id, queue_id, event_type, event_id, config_id, webhook_url, \
             status, retry_count, next_retry_at",
        );
        for tier in 0..ATTEMPT_SLOTS {
            cols.push_str(&format!(
                ", retry_{tier}_started_at, retry_{tier}_completed_at, \
                 retry_{tier}_duration_ms, retry_{tier}_http_status, \
                 retry_{tier}_response_body, retry_{tier}_error"
            ));
        }
        cols.push_str(
            ", last_error, last_http_status, created_at, updated_at, \
             processing_started_at, completed_at, deleted_at",
        );
        cols
    })
}

/// Repository for webhook queue database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a new queue row.
    ///
    /// The database assigns the monotonic id; `queue_id` is taken from the
    /// row (assigned at construction). The row is persisted as PENDING at
    /// tier 0, eligible immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or constraints are violated.
    pub async fn insert(&self, row: &WebhookQueueRow) -> Result<WebhookQueueRow> {
        let sql = format!(
            "INSERT INTO webhook_queue (
                queue_id, event_type, event_id, config_id, webhook_url,
                status, retry_count, next_retry_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}",
            row_columns()
        );

        let inserted = sqlx::query_as::<_, WebhookQueueRow>(&sql)
            .bind(row.queue_id)
            .bind(row.event_type)
            .bind(&row.event_id)
            .bind(row.config_id)
            .bind(&row.webhook_url)
            .bind(WebhookStatus::Pending)
            .bind(0_i32)
            .bind(row.next_retry_at)
            .bind(row.created_at)
            .bind(row.updated_at)
            .fetch_one(&*self.pool)
            .await?;

        Ok(inserted)
    }

    /// Atomically claims the next eligible row for a retry tier.
    ///
    /// Selects the single PENDING row with `retry_count = tier` and
    /// `next_retry_at <= now`, oldest eligibility first, locking it with
    /// `FOR UPDATE SKIP LOCKED` so concurrent claimants never block or
    /// double-claim. The row is flipped to PROCESSING before the transaction
    /// commits. Returns `None` when no eligible row exists.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails; a failed claim never returns
    /// a row.
    pub async fn claim_next(&self, tier: i32) -> Result<Option<WebhookQueueRow>> {
        if !(0..=MAX_RETRY_COUNT).contains(&tier) {
            return Err(CoreError::InvalidInput(format!("retry tier out of range: {tier}")));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r"
            SELECT id FROM webhook_queue
            WHERE status = 'PENDING'
              AND retry_count = $1
              AND next_retry_at <= $2
              AND deleted_at IS NULL
            ORDER BY next_retry_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(tier)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.commit().await?;
            return Ok(None);
        };

        let sql = format!(
            "UPDATE webhook_queue
             SET status = 'PROCESSING', updated_at = $1
             WHERE id = $2
             RETURNING {}",
            row_columns()
        );

        let row =
            sqlx::query_as::<_, WebhookQueueRow>(&sql).bind(now).bind(id).fetch_one(&mut *tx).await?;

        tx.commit().await?;

        Ok(Some(row))
    }

    /// Writes the tier-k attempt slot and mirrors the summary fields.
    ///
    /// `last_http_status` always mirrors the attempt; `last_error` is only
    /// overwritten when the attempt carries an error, so a later success
    /// leaves the prior failure visible.
    ///
    /// # Errors
    ///
    /// Returns error if the tier is out of range or the update fails.
    pub async fn record_attempt(&self, id: i64, tier: i32, record: &AttemptRecord) -> Result<()> {
        if !(0..=MAX_RETRY_COUNT).contains(&tier) {
            return Err(CoreError::InvalidInput(format!("retry tier out of range: {tier}")));
        }

        let sql = format!(
            "UPDATE webhook_queue SET
                retry_{tier}_started_at = $1,
                retry_{tier}_completed_at = $2,
                retry_{tier}_duration_ms = $3,
                retry_{tier}_http_status = $4,
                retry_{tier}_response_body = $5,
                retry_{tier}_error = $6,
                last_http_status = $4,
                last_error = CASE WHEN $6 IS NULL THEN last_error ELSE $6 END,
                updated_at = $7
             WHERE id = $8"
        );

        sqlx::query(&sql)
            .bind(record.started_at)
            .bind(record.completed_at)
            .bind(record.duration_ms)
            .bind(record.http_status)
            .bind(&record.response_body)
            .bind(&record.error)
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Marks a row as COMPLETED.
    ///
    /// `processing_started_at` records the start of the attempt that
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_completed(
        &self,
        id: i64,
        processing_started_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            UPDATE webhook_queue
            SET status = 'COMPLETED',
                processing_started_at = $1,
                completed_at = $2,
                updated_at = $2
            WHERE id = $3
            ",
        )
        .bind(processing_started_at)
        .bind(now)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Marks a row as permanently FAILED.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_failed(&self, id: i64, error_msg: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            UPDATE webhook_queue
            SET status = 'FAILED',
                last_error = $1,
                updated_at = $2
            WHERE id = $3
            ",
        )
        .bind(error_msg)
        .bind(now)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Applies a partial update to a persisted row.
    ///
    /// Fields absent from the update leave the persisted value unchanged.
    /// Used to reschedule failed attempts and to reset stuck rows back to
    /// PENDING.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update(&self, id: i64, update: &QueueRowUpdate) -> Result<()> {
        sqlx::query(
            r"
            UPDATE webhook_queue SET
                status = COALESCE($1, status),
                retry_count = COALESCE($2, retry_count),
                next_retry_at = COALESCE($3, next_retry_at),
                last_error = COALESCE($4, last_error),
                last_http_status = COALESCE($5, last_http_status),
                updated_at = COALESCE($6, updated_at),
                processing_started_at = COALESCE($7, processing_started_at),
                completed_at = COALESCE($8, completed_at),
                deleted_at = COALESCE($9, deleted_at)
            WHERE id = $10
            ",
        )
        .bind(update.status)
        .bind(update.retry_count)
        .bind(update.next_retry_at)
        .bind(&update.last_error)
        .bind(update.last_http_status)
        .bind(update.updated_at)
        .bind(update.processing_started_at)
        .bind(update.completed_at)
        .bind(update.deleted_at)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a row by its internal id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<WebhookQueueRow>> {
        let sql = format!("SELECT {} FROM webhook_queue WHERE id = $1", row_columns());

        let row = sqlx::query_as::<_, WebhookQueueRow>(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row)
    }

    /// Finds a row by its external queue id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_queue_id(&self, queue_id: QueueId) -> Result<Option<WebhookQueueRow>> {
        let sql = format!("SELECT {} FROM webhook_queue WHERE queue_id = $1", row_columns());

        let row = sqlx::query_as::<_, WebhookQueueRow>(&sql)
            .bind(queue_id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row)
    }

    /// Counts rows by status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_status(&self, status: WebhookStatus) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM webhook_queue WHERE status = $1")
                .bind(status)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }

    /// Releases rows stuck in PROCESSING back to PENDING.
    ///
    /// A process that dies between claim and terminal write leaves its row
    /// in PROCESSING forever. This moves every PROCESSING row whose
    /// `updated_at` is older than `cutoff` back to PENDING so it can be
    /// claimed again. The cutoff policy belongs to the operator; nothing in
    /// the engine invokes this automatically.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn release_stuck(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE webhook_queue
            SET status = 'PENDING', updated_at = $1
            WHERE status = 'PROCESSING' AND updated_at < $2
            ",
        )
        .bind(Utc::now())
        .bind(cutoff)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Soft-deletes a row.
    ///
    /// Administrative action; the row stops being eligible for claims but
    /// is retained for audit.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn soft_delete(&self, id: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE webhook_queue
            SET deleted_at = $1, updated_at = $1
            WHERE id = $2 AND deleted_at IS NULL
            ",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}
