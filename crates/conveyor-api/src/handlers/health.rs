//! Liveness probe with dependency status.

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Response body for the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status: `healthy` or `degraded`.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Current server time, RFC 3339.
    pub timestamp: String,
    /// Status of each dependency.
    pub dependencies: HashMap<String, String>,
    /// Seconds since process start.
    pub uptime_seconds: i64,
}

/// Reports liveness and database connectivity.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = state.storage.health_check().await.is_ok();

    let mut dependencies = HashMap::new();
    dependencies.insert(
        "database".to_string(),
        if database_ok { "connected" } else { "unavailable" }.to_string(),
    );

    let status_code = if database_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let now = Utc::now();

    (
        status_code,
        Json(HealthResponse {
            status: if database_ok { "healthy" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: now.to_rfc3339(),
            dependencies,
            uptime_seconds: (now - state.started_at).num_seconds(),
        }),
    )
}
