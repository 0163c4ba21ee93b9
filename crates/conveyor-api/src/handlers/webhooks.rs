//! Webhook creation handler.
//!
//! Resolves the referenced configuration, denormalizes its URL onto a new
//! queue row, and inserts exactly one PENDING row for the delivery workers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conveyor_core::{
    global_metrics,
    models::{ConfigId, EventType, WebhookQueueRow},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::AppState;

/// Request body for webhook creation.
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    /// Event category being announced.
    pub event_type: EventType,
    /// Caller-supplied correlation string for the originating event.
    pub event_id: String,
    /// Configuration to deliver through.
    pub config_id: i64,
}

/// Response from webhook creation.
#[derive(Debug, Serialize)]
pub struct CreateWebhookResponse {
    /// Whether the webhook was accepted.
    pub success: bool,
    /// Human-readable outcome description.
    pub message: String,
    /// External queue id assigned to the accepted row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    /// When the row was created, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl CreateWebhookResponse {
    fn rejected(message: String) -> Self {
        Self { success: false, message, queue_id: None, created_at: None }
    }
}

/// Accepts a webhook-send request.
///
/// Acceptance acknowledges queueing, not delivery; the delivery outcome is
/// observable only through the persisted row.
pub async fn create_webhook(
    State(state): State<AppState>,
    Json(request): Json<CreateWebhookRequest>,
) -> Response {
    let config_id = ConfigId(request.config_id);

    let config = match state.storage.webhook_configs.find_by_id(config_id).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            warn!(config_id = %config_id, "webhook config not found");
            global_metrics().record_rejected();
            return (
                StatusCode::NOT_FOUND,
                Json(CreateWebhookResponse::rejected(format!(
                    "webhook config not found: {config_id}"
                ))),
            )
                .into_response();
        },
        Err(e) => {
            error!(config_id = %config_id, error = %e, "failed to load webhook config");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateWebhookResponse::rejected("failed to load webhook config".to_string())),
            )
                .into_response();
        },
    };

    if !config.is_active {
        warn!(config_id = %config_id, "webhook config is not active");
        global_metrics().record_rejected();
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(CreateWebhookResponse::rejected(format!(
                "webhook config is not active: {config_id}"
            ))),
        )
            .into_response();
    }

    let row = WebhookQueueRow::new(
        request.event_type,
        request.event_id.clone(),
        config_id,
        config.webhook_url.clone(),
    );

    match state.storage.webhook_queue.insert(&row).await {
        Ok(inserted) => {
            info!(
                queue_id = %inserted.queue_id,
                event_type = %inserted.event_type,
                event_id = %inserted.event_id,
                "webhook entry created"
            );
            global_metrics().record_received();

            (
                StatusCode::OK,
                Json(CreateWebhookResponse {
                    success: true,
                    message: "webhook created successfully".to_string(),
                    queue_id: Some(inserted.queue_id.to_string()),
                    created_at: Some(inserted.created_at.to_rfc3339()),
                }),
            )
                .into_response()
        },
        Err(e) => {
            error!(config_id = %config_id, error = %e, "failed to create webhook queue entry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateWebhookResponse::rejected(
                    "failed to create webhook queue entry".to_string(),
                )),
            )
                .into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_uppercase_event_types() {
        let request: CreateWebhookRequest = serde_json::from_str(
            r#"{"event_type": "CREDIT", "event_id": "txn-42", "config_id": 7}"#,
        )
        .unwrap();

        assert_eq!(request.event_type, EventType::Credit);
        assert_eq!(request.event_id, "txn-42");
        assert_eq!(request.config_id, 7);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result: Result<CreateWebhookRequest, _> = serde_json::from_str(
            r#"{"event_type": "TRANSFER", "event_id": "txn-42", "config_id": 7}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn rejected_response_omits_queue_fields() {
        let response = CreateWebhookResponse::rejected("nope".to_string());
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("queue_id"));
        assert!(!json.contains("created_at"));
    }
}
