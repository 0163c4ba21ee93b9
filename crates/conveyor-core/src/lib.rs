//! Core domain models and persistence for the webhook delivery queue.
//!
//! Provides strongly-typed domain primitives, the relational queue
//! repositories, and shared infrastructure (errors, clock, metrics) that the
//! delivery and intake crates build on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use metrics::{global_metrics, Metrics};
pub use models::{
    AttemptRecord, AttemptSlot, ConfigId, EventType, QueueId, QueueRowUpdate, WebhookConfig,
    WebhookQueueRow, WebhookStatus, MAX_RETRY_COUNT,
};
pub use time::{Clock, RealClock};
