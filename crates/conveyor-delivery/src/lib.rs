//! Webhook delivery engine with tiered retry workers.
//!
//! A fixed roster of workers, each dedicated to one retry tier (0..=6),
//! cooperates against the shared PostgreSQL queue. Every worker claims at
//! most one row per poll tick using `FOR UPDATE SKIP LOCKED`, so N processes
//! running identical rosters stay correct with no in-process coordination.
//!
//! # Architecture
//!
//! ```text
//!                 ┌─────────────────────────────────────────┐
//!                 │               PostgreSQL                │
//!                 │  webhook_queue (status, retry_count,    │
//!                 │   next_retry_at) FOR UPDATE SKIP LOCKED │
//!                 └─────────────────────────────────────────┘
//!                        │ single-row claims, per tier
//!          ┌─────────────┼──────────────┬──────────────┐
//!          ▼             ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │ tier-0 × 3 │ │ tier-1 @30s│ │ tier-2 @2m │ │ ... tier-6 │
//!   │   @5s      │ │            │ │            │ │    @60m    │
//!   └────────────┘ └────────────┘ └────────────┘ └────────────┘
//!          │             │              │              │
//!          ▼             ▼              ▼              ▼
//!              HTTP GET to the row's webhook_url
//! ```
//!
//! Higher tiers poll slowly because their rows become eligible slowly; the
//! backoff table is chosen so each tier's poll interval is well below the
//! delay that feeds it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod processor;
pub mod retry;
pub mod storage;
pub mod worker;
pub mod worker_pool;

pub use client::{ClientConfig, DispatchClient, DispatchResponse};
pub use error::{DeliveryError, Result};
pub use processor::AttemptProcessor;
pub use storage::{PostgresQueueStore, QueueStore};
pub use worker::RetryWorker;
pub use worker_pool::{default_roster, WorkerPool, WorkerSpec};

/// User agent presented on every outbound delivery.
pub const USER_AGENT: &str = "Webhook-Processor/1.0";

/// Default outbound HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
