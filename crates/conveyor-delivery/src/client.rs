//! HTTP client for outbound webhook dispatch.
//!
//! One attempt is a single GET to the row's denormalized URL. The response
//! body is read whole; transport failures (construction, connect, transport,
//! body read) surface as [`DeliveryError`] values for the processor to
//! classify.

use std::time::Duration;

use conveyor_core::models::WebhookQueueRow;
use tracing::debug;

use crate::error::{DeliveryError, Result};

/// Configuration for the dispatch client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-call timeout for outbound requests.
    pub timeout: Duration,
    /// Maximum idle connections kept per host.
    pub max_idle_connections: usize,
    /// How long idle connections are kept before being closed.
    pub idle_timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            max_idle_connections: 100,
            idle_timeout: Duration::from_secs(90),
            user_agent: crate::USER_AGENT.to_string(),
        }
    }
}

/// Response from one dispatch attempt that produced an HTTP response.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Entire response body as a string.
    pub body: String,
    /// Wall-clock duration of the request.
    pub duration: Duration,
}

impl DispatchResponse {
    /// Whether the status code classifies the attempt as a success.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// HTTP client shared across all workers.
///
/// Connection pooling is the point of sharing: idle connections to a target
/// are reused across workers and tiers.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DispatchClient {
    /// Creates a new dispatch client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.idle_timeout)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new dispatch client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Performs one outbound GET to the row's webhook URL.
    ///
    /// The URL is used verbatim, including any query string. Headers sent:
    /// the configured user agent and `Accept: application/json`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the request cannot be constructed,
    /// the connection fails, the request times out, or the body cannot be
    /// read. Non-2xx responses are NOT errors; classification is the
    /// processor's job.
    pub async fn send(&self, row: &WebhookQueueRow) -> Result<DispatchResponse> {
        let start = std::time::Instant::now();

        debug!(queue_id = %row.queue_id, url = %row.webhook_url, "dispatching webhook");

        let response = self
            .client
            .get(&row.webhook_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::timeout(self.config.timeout.as_secs())
                } else if e.is_connect() {
                    DeliveryError::network(format!("connection failed: {e}"))
                } else {
                    DeliveryError::network(e.to_string())
                }
            })?;

        let status_code = response.status().as_u16();

        let body = response
            .bytes()
            .await
            .map_err(|e| DeliveryError::network(format!("failed to read response body: {e}")))?;
        let body = String::from_utf8_lossy(&body).into_owned();

        let duration = start.elapsed();

        debug!(
            queue_id = %row.queue_id,
            status = status_code,
            duration_ms = duration.as_millis(),
            "received response"
        );

        Ok(DispatchResponse { status_code, body, duration })
    }
}

#[cfg(test)]
mod tests {
    use conveyor_core::models::{ConfigId, EventType, WebhookQueueRow};
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn row_for(url: String) -> WebhookQueueRow {
        WebhookQueueRow::new(EventType::Credit, "evt-client".to_string(), ConfigId(1), url)
    }

    #[tokio::test]
    async fn successful_dispatch_returns_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let client = DispatchClient::with_defaults().unwrap();
        let response = client.send(&row_for(format!("{}/hook", server.uri()))).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "{\"ok\":true}");
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn non_success_status_is_not_a_transport_error() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let client = DispatchClient::with_defaults().unwrap();
        let response = client.send(&row_for(format!("{}/hook", server.uri()))).await.unwrap();

        assert_eq!(response.status_code, 503);
        assert_eq!(response.body, "Service Unavailable");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn required_headers_are_sent() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::header("user-agent", crate::USER_AGENT))
            .and(matchers::header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = DispatchClient::with_defaults().unwrap();
        let result = client.send(&row_for(format!("{}/hook", server.uri()))).await;

        assert!(result.is_ok());
        server.verify().await;
    }

    #[tokio::test]
    async fn query_string_is_preserved() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/hook"))
            .and(matchers::query_param("token", "abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = DispatchClient::with_defaults().unwrap();
        let result = client.send(&row_for(format!("{}/hook?token=abc", server.uri()))).await;

        assert!(result.is_ok());
        server.verify().await;
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let client = DispatchClient::with_defaults().unwrap();

        // Port 1 is reserved and never listening.
        let result = client.send(&row_for("http://127.0.0.1:1/hook".to_string())).await;

        match result {
            Err(DeliveryError::Network { .. }) => {},
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = ClientConfig { timeout: Duration::from_millis(100), ..Default::default() };
        let client = DispatchClient::new(config).unwrap();
        let result = client.send(&row_for(format!("{}/hook", server.uri()))).await;

        match result {
            Err(DeliveryError::Timeout { .. }) => {},
            other => panic!("expected timeout error, got {other:?}"),
        }
    }
}
