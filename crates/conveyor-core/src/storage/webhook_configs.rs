//! Repository for webhook configuration lookups.
//!
//! Configurations are read-only to the delivery engine; intake resolves
//! them to validate requests and denormalize the target URL onto new rows.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{ConfigId, EventType, WebhookConfig},
};

const CONFIG_COLUMNS: &str =
    "id, name, event_type, webhook_url, is_active, timeout_ms, created_at, updated_at";

/// Repository for webhook configuration database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates a new active configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or constraints are violated.
    pub async fn create(
        &self,
        name: &str,
        event_type: EventType,
        webhook_url: &str,
        timeout_ms: i32,
    ) -> Result<WebhookConfig> {
        let sql = format!(
            "INSERT INTO webhook_configs (name, event_type, webhook_url, is_active, timeout_ms)
             VALUES ($1, $2, $3, TRUE, $4)
             RETURNING {CONFIG_COLUMNS}"
        );

        let config = sqlx::query_as::<_, WebhookConfig>(&sql)
            .bind(name)
            .bind(event_type)
            .bind(webhook_url)
            .bind(timeout_ms)
            .fetch_one(&*self.pool)
            .await?;

        Ok(config)
    }

    /// Finds a configuration by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: ConfigId) -> Result<Option<WebhookConfig>> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM webhook_configs WHERE id = $1");

        let config = sqlx::query_as::<_, WebhookConfig>(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(config)
    }

    /// Finds all active configurations for an event type.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active(&self, event_type: EventType) -> Result<Vec<WebhookConfig>> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM webhook_configs
             WHERE event_type = $1 AND is_active = TRUE
             ORDER BY id ASC"
        );

        let configs = sqlx::query_as::<_, WebhookConfig>(&sql)
            .bind(event_type)
            .fetch_all(&*self.pool)
            .await?;

        Ok(configs)
    }
}
