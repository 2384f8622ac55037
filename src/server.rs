//! Service initialization and runtime lifecycle.
//!
//! Handles database and event log connections, pipeline startup, the Axum
//! server, and graceful shutdown.

use crate::application::pipeline::{Pipeline, PipelineSettings};
use crate::config::Config;
use crate::domain::repositories::ClickRepository;
use crate::infrastructure::event_log::{EventLog, InMemoryEventLog, RedisStreamLog};
use crate::infrastructure::persistence::PgClickRepository;
use crate::routes::app_router;
use crate::state::AppState;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Opens the PostgreSQL pool with the configured limits.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");
    Ok(pool)
}

/// Connects the durable event log and makes sure its topic exists.
///
/// Without a Redis URL the log lives in process memory.
pub async fn connect_event_log(config: &Config) -> Result<Arc<dyn EventLog>> {
    let log: Arc<dyn EventLog> = match &config.redis_url {
        Some(redis_url) => Arc::new(
            RedisStreamLog::connect_with_retry(
                redis_url,
                &config.stream_key,
                &config.consumer_group,
            )
            .await
            .context("Failed to connect to the event log")?,
        ),
        None => {
            tracing::warn!(
                "REDIS_URL not set: using an in-memory event log, queued clicks will not survive a restart"
            );
            Arc::new(InMemoryEventLog::new())
        }
    };

    log.ensure_topic()
        .await
        .context("Failed to create event log topic")?;
    Ok(log)
}

/// Runs the service until SIGINT/SIGTERM.
///
/// Initializes:
/// - PostgreSQL connection pool and migrations
/// - Durable event log (Redis Streams or in-memory)
/// - Click pipeline (ingress, consumers, sweeper)
/// - Axum HTTP server
///
/// On shutdown the server stops accepting first, then the pipeline drains.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection or migration fails
/// - Event log connection fails after retries
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let pool = connect_database(&config).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let log = connect_event_log(&config).await?;
    let repository: Arc<dyn ClickRepository> = Arc::new(PgClickRepository::new(Arc::new(pool)));

    let pipeline = Pipeline::start(repository, log, PipelineSettings::from_config(&config));
    let app = app_router(AppState::from_pipeline(&pipeline));

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    let served = axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    pipeline.shutdown().await;
    served?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
