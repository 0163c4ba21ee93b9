//! Intake HTTP server for the webhook delivery engine.
//!
//! Accepts webhook-send requests, resolves their configuration, and persists
//! queue rows for the delivery workers. Also serves liveness and Prometheus
//! metrics endpoints.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use conveyor_core::storage::Storage;

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Storage layer providing repository access.
    pub storage: Arc<Storage>,
    /// When this process started, for uptime reporting.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates the shared application state.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage, started_at: Utc::now() }
    }
}
