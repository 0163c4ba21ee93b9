//! Webhook delivery daemon.
//!
//! Main entry point: loads configuration, prepares the database, starts the
//! intake HTTP server and the tiered worker pool, and coordinates graceful
//! shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use conveyor_api::Config;
use conveyor_core::{storage::Storage, RealClock};
use conveyor_delivery::{
    default_roster, AttemptProcessor, DispatchClient, PostgresQueueStore, WorkerPool,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting webhook delivery service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        api_port = config.api_port,
        "configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&db_pool).await?;
    info!("database schema ready");

    let storage = Arc::new(Storage::new(db_pool.clone()));

    // Intake server runs alongside the workers in this process.
    let addr = config.server_addr()?;
    let server_handle = tokio::spawn({
        let storage = storage.clone();
        let config = config.clone();
        async move {
            if let Err(e) = conveyor_api::start_server(storage, &config, addr).await {
                error!(error = %e, "intake server failed");
            }
        }
    });

    let client = Arc::new(DispatchClient::new(config.to_client_config())?);
    let store = Arc::new(PostgresQueueStore::new(storage.clone()));
    let processor = Arc::new(AttemptProcessor::new(store, client));

    let mut pool = WorkerPool::new(processor, default_roster(), Arc::new(RealClock::new()));
    pool.start().await.context("failed to start worker pool")?;
    info!("worker pool started successfully");

    shutdown_signal().await;
    info!("shutdown signal received, stopping worker pool");

    if let Err(e) = pool.stop().await {
        error!(error = %e, "failed to stop worker pool");
    } else {
        info!("worker pool stopped successfully");
    }

    // The intake server shares the same signal handlers and drains on its own.
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(30)) => {
            info!("shutdown grace period expired");
        }
        _ = server_handle => {
            info!("intake server stopped");
        }
    }

    db_pool.close().await;
    info!("webhook delivery service shutdown complete");

    Ok(())
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,conveyor=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with startup retries.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.db_max_open_conns)
            .min_connections(config.db_max_idle_conns)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url())
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Creates the schema when absent.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_configs (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            event_type TEXT NOT NULL CHECK (event_type IN ('CREDIT', 'DEBIT')),
            webhook_url TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            timeout_ms INTEGER NOT NULL DEFAULT 30000,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create webhook_configs table")?;

    let mut attempt_columns = String::new();
    for tier in 0..=6 {
        attempt_columns.push_str(&format!(
            "retry_{tier}_started_at TIMESTAMPTZ,
             retry_{tier}_completed_at TIMESTAMPTZ,
             retry_{tier}_duration_ms BIGINT,
             retry_{tier}_http_status INTEGER,
             retry_{tier}_response_body TEXT,
             retry_{tier}_error TEXT,\n"
        ));
    }

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_queue (
            id BIGSERIAL PRIMARY KEY,
            queue_id UUID NOT NULL UNIQUE,
            event_type TEXT NOT NULL CHECK (event_type IN ('CREDIT', 'DEBIT')),
            event_id TEXT NOT NULL,
            config_id BIGINT NOT NULL REFERENCES webhook_configs(id),
            webhook_url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
            retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count BETWEEN 0 AND 6),
            next_retry_at TIMESTAMPTZ NOT NULL,
            {attempt_columns}
            last_error TEXT,
            last_http_status INTEGER,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            processing_started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            deleted_at TIMESTAMPTZ
        )
        "#
    ))
    .execute(pool)
    .await
    .context("failed to create webhook_queue table")?;

    // The claim path filters on status + retry_count + next_retry_at; the
    // partial index keeps it O(log n) in queue depth.
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_webhook_queue_pending
        ON webhook_queue (status, next_retry_at)
        WHERE status = 'PENDING'
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create webhook_queue claim index")?;

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received CTRL+C signal"),
        _ = terminate => info!("received SIGTERM signal"),
    }
}
