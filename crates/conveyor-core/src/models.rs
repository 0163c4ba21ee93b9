//! Core domain models and strongly-typed identifiers.
//!
//! Defines the webhook queue row with its seven per-tier attempt slots,
//! webhook configurations, status and event-type enums, and newtype ID
//! wrappers for compile-time type safety.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgRow = sqlx::postgres::PgRow;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Maximum value of `retry_count`. A row at this tier either completes or
/// fails permanently; there is no eighth attempt. Fixed by the schema
/// (retry_0 through retry_6 = 7 total attempts).
pub const MAX_RETRY_COUNT: i32 = 6;

/// Number of per-tier attempt slots on a queue row (tiers 0..=6).
pub const ATTEMPT_SLOTS: usize = (MAX_RETRY_COUNT + 1) as usize;

/// Strongly-typed external queue identifier.
///
/// Wraps the UUID assigned at insert time. The numeric primary key stays
/// internal; callers correlate on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub Uuid);

impl QueueId {
    /// Creates a new random queue ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for QueueId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for QueueId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for QueueId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for QueueId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed webhook configuration identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigId(pub i64);

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConfigId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for ConfigId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ConfigId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for ConfigId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Business event category a webhook announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// Funds credited to an account.
    Credit,
    /// Funds debited from an account.
    Debit,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credit => write!(f, "CREDIT"),
            Self::Debit => write!(f, "DEBIT"),
        }
    }
}

impl sqlx::Type<PgDb> for EventType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "CREDIT" => Ok(Self::Credit),
            "DEBIT" => Ok(Self::Debit),
            _ => Err(format!("invalid event type: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for EventType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Queue row lifecycle status.
///
/// Rows progress through these states during processing:
///
/// ```text
/// Pending -> Processing -> Completed
///         ^             -> Failed (tier 6 exhausted)
///         └── Processing (failed attempt, tier < 6)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookStatus {
    /// Waiting in the queue; eligible once `next_retry_at` has passed.
    Pending,

    /// A worker holds the row lock and is attempting delivery.
    ///
    /// This state prevents duplicate deliveries.
    Processing,

    /// Delivered with a 2xx response. Terminal.
    Completed,

    /// All seven attempts exhausted. Terminal.
    Failed,
}

impl WebhookStatus {
    /// Whether this status is absorbing (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl sqlx::Type<PgDb> for WebhookStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WebhookStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("invalid webhook status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for WebhookStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Webhook endpoint configuration.
///
/// Read-only to the delivery engine. The target URL is denormalized onto
/// queue rows at insert time so URL changes never alter in-flight rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookConfig {
    /// Unique identifier for this configuration.
    pub id: ConfigId,

    /// Human-readable configuration name.
    pub name: String,

    /// Event category this configuration subscribes to.
    pub event_type: EventType,

    /// Target URL for webhook delivery, used verbatim including any query
    /// string.
    pub webhook_url: String,

    /// Whether this configuration accepts new webhooks.
    ///
    /// Inactive configurations are rejected at intake.
    pub is_active: bool,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: i32,

    /// When this configuration was created.
    pub created_at: DateTime<Utc>,

    /// When this configuration was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Audit record of one delivery attempt at a specific tier.
///
/// Slot fields are written once, when the tier executes, and are immutable
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSlot {
    /// When the attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the attempt finished (response or transport failure).
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: Option<i64>,
    /// HTTP status code received; absent on transport errors.
    pub http_status: Option<i32>,
    /// Response body as returned by the endpoint.
    pub response_body: Option<String>,
    /// Error message when the attempt was classified as a failure.
    pub error: Option<String>,
}

impl AttemptSlot {
    /// Whether this tier has executed.
    pub fn is_recorded(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Input to `record_attempt`: the outcome of one delivery attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// HTTP status code; `None` on transport errors.
    pub http_status: Option<i32>,
    /// Response body; empty on transport errors.
    pub response_body: String,
    /// Error message when the attempt failed; `None` on success.
    pub error: Option<String>,
}

/// The central queue entity: one outbound webhook delivery.
///
/// Tracks identity, routing, the retry state machine, per-tier attempt
/// history, and lifecycle timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookQueueRow {
    /// Internal monotonic primary key. Zero until persisted.
    pub id: i64,

    /// External UUID assigned at insert.
    pub queue_id: QueueId,

    /// Event category being announced.
    pub event_type: EventType,

    /// Caller-supplied correlation string for the originating event.
    pub event_id: String,

    /// Configuration this delivery was created from.
    pub config_id: ConfigId,

    /// Resolved target URL, denormalized from the configuration at insert.
    pub webhook_url: String,

    /// Current lifecycle status.
    pub status: WebhookStatus,

    /// Number of failed attempts so far; also the tier the next attempt
    /// executes at. Monotone non-decreasing, never exceeds
    /// [`MAX_RETRY_COUNT`].
    pub retry_count: i32,

    /// Earliest UTC instant this row is eligible to be claimed.
    pub next_retry_at: DateTime<Utc>,

    /// Per-tier attempt history, index k = tier k.
    pub attempts: [AttemptSlot; ATTEMPT_SLOTS],

    /// Error message from the most recent failed attempt.
    ///
    /// Deliberately never cleared by a later success; the prior failure
    /// remains visible for audit.
    pub last_error: Option<String>,

    /// HTTP status of the most recent attempt; absent after transport errors.
    pub last_http_status: Option<i32>,

    /// When this row was inserted.
    pub created_at: DateTime<Utc>,

    /// When this row was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Start of the attempt that completed the row.
    pub processing_started_at: Option<DateTime<Utc>>,

    /// When the row first entered a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Soft-delete marker; set out-of-band by administrative action.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WebhookQueueRow {
    /// Creates a new row ready for insertion: pending, tier 0, eligible now.
    pub fn new(
        event_type: EventType,
        event_id: String,
        config_id: ConfigId,
        webhook_url: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            queue_id: QueueId::new(),
            event_type,
            event_id,
            config_id,
            webhook_url,
            status: WebhookStatus::Pending,
            retry_count: 0,
            next_retry_at: now,
            attempts: Default::default(),
            last_error: None,
            last_http_status: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }

    /// Whether another attempt may be scheduled after a failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < MAX_RETRY_COUNT && self.status != WebhookStatus::Completed
    }

    /// The attempt slot for a tier, if the tier is in range.
    pub fn attempt(&self, tier: i32) -> Option<&AttemptSlot> {
        usize::try_from(tier).ok().and_then(|t| self.attempts.get(t))
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for WebhookQueueRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let mut attempts: [AttemptSlot; ATTEMPT_SLOTS] = Default::default();
        for (tier, slot) in attempts.iter_mut().enumerate() {
            *slot = AttemptSlot {
                started_at: row.try_get(format!("retry_{tier}_started_at").as_str())?,
                completed_at: row.try_get(format!("retry_{tier}_completed_at").as_str())?,
                duration_ms: row.try_get(format!("retry_{tier}_duration_ms").as_str())?,
                http_status: row.try_get(format!("retry_{tier}_http_status").as_str())?,
                response_body: row.try_get(format!("retry_{tier}_response_body").as_str())?,
                error: row.try_get(format!("retry_{tier}_error").as_str())?,
            };
        }

        Ok(Self {
            id: row.try_get("id")?,
            queue_id: row.try_get("queue_id")?,
            event_type: row.try_get("event_type")?,
            event_id: row.try_get("event_id")?,
            config_id: row.try_get("config_id")?,
            webhook_url: row.try_get("webhook_url")?,
            status: row.try_get("status")?,
            retry_count: row.try_get("retry_count")?,
            next_retry_at: row.try_get("next_retry_at")?,
            attempts,
            last_error: row.try_get("last_error")?,
            last_http_status: row.try_get("last_http_status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            processing_started_at: row.try_get("processing_started_at")?,
            completed_at: row.try_get("completed_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

/// Partial update applied to a persisted queue row.
///
/// Only `Some` fields are written; `None` fields leave the persisted value
/// untouched. This is the typed replacement for zero-value merge updates:
/// an absent field can never clobber stored state.
#[derive(Debug, Clone, Default)]
pub struct QueueRowUpdate {
    /// New lifecycle status.
    pub status: Option<WebhookStatus>,
    /// New retry count.
    pub retry_count: Option<i32>,
    /// New eligibility instant.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// New summary error message.
    pub last_error: Option<String>,
    /// New summary HTTP status.
    pub last_http_status: Option<i32>,
    /// New modification timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// Start of the attempt that completed the row.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// Terminal-state timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}
