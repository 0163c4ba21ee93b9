//! Database access layer implementing the repository pattern for the
//! webhook queue.
//!
//! Repositories translate between domain models and the relational schema.
//! All database operations go through this module; direct SQL elsewhere is
//! forbidden to keep the claim protocol in one place.

use std::sync::Arc;

use sqlx::PgPool;

pub mod webhook_configs;
pub mod webhook_queue;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for queue row operations, including the atomic claim.
    pub webhook_queue: Arc<webhook_queue::Repository>,

    /// Repository for webhook configurations.
    pub webhook_configs: Arc<webhook_configs::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    ///
    /// Repositories share the pool behind an `Arc`.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            webhook_queue: Arc::new(webhook_queue::Repository::new(pool.clone())),
            webhook_configs: Arc::new(webhook_configs::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.webhook_queue.pool()).await?;

        Ok(())
    }
}
