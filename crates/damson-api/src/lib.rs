//! Damson API
//!
//! HTTP surface of the asset pipeline: ingestion (two-phase and
//! single-phase), retrieval via signed-URL redirects, asset deletion, and
//! queue metrics. The processing worker pool runs inside the same process,
//! polling the jobs table.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use damson_core::Config;
use damson_db::{AssetRepository, JobRepository, VersionRepository};
use damson_processing::StrategyContext;
use damson_storage::create_storage;
use damson_worker::{JobQueue, JobQueueConfig, VersionProcessor};

pub use state::AppState;

/// Wire up the pipeline and serve until the process is stopped.
pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let storage = create_storage(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create storage backend: {}", e))?;

    let assets = AssetRepository::new(pool.clone());
    let versions = VersionRepository::new(pool.clone());
    let jobs = JobRepository::new(pool.clone());

    let processor = Arc::new(VersionProcessor::new(
        versions.clone(),
        storage.clone(),
        StrategyContext::from_config(&config),
    ));

    let queue = JobQueue::new(
        jobs.clone(),
        JobQueueConfig {
            max_workers: config.queue_max_workers,
            poll_interval_ms: config.queue_poll_interval_ms,
            job_timeout_seconds: config.queue_job_timeout_seconds,
            stale_reap_interval_secs: config.queue_stale_reap_interval_secs,
            stale_grace_period_secs: config.queue_stale_grace_period_secs,
        },
        processor,
    );

    let port = config.server_port;
    let backend = storage.backend();

    let state = Arc::new(AppState {
        config,
        assets,
        versions,
        jobs,
        storage,
        queue,
        pool,
    });

    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    tracing::info!(port = port, storage_backend = %backend, "damson API listening");

    axum::serve(listener, router)
        .await
        .context("Server terminated")?;

    Ok(())
}
