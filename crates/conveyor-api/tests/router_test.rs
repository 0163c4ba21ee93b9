//! Router-level tests that do not require a live database.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use conveyor_api::{create_router, Config};
use conveyor_core::storage::Storage;
use tower::ServiceExt;

fn test_router() -> axum::Router {
    // Lazy pool: no connection is attempted until a query runs, and none of
    // the routes exercised here touch the database.
    let pool = sqlx::PgPool::connect_lazy("postgresql://test").expect("lazy pool should build");
    create_router(Arc::new(Storage::new(pool)), &Config::default())
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let router = test_router();

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("conveyor_webhooks_received_total"));
    assert!(text.contains("conveyor_attempts_total{tier=\"0\"}"));
}

#[tokio::test]
async fn create_webhook_rejects_unknown_event_type() {
    let router = test_router();

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"event_type": "TRANSFER", "event_id": "txn-1", "config_id": 1}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    // Serde rejects the enum value before any storage access.
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_webhook_requires_json_content_type() {
    let router = test_router();

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .body(Body::from("event_type=CREDIT"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let router = test_router();

    let response = router
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
