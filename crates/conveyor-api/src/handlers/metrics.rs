//! Prometheus text exposition endpoint.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use conveyor_core::global_metrics;

/// Serves all counters in Prometheus text format.
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        global_metrics().to_prometheus(),
    )
}
