//! Job queue: worker pool, polling, retry, and submission.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop claiming; it
//! does not wait for in-flight jobs. For graceful shutdown, coordinate with
//! your runtime and allow time for running jobs to finish before process
//! exit.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use damson_core::models::{Job, JobPayload};
use damson_core::JobError;
use damson_db::{EnqueueOptions, JobRepository};

/// Maximum delay in seconds before retrying a failed job. Caps exponential
/// backoff so that high attempt counts do not produce excessively long
/// delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempts: i32) -> u64 {
    (2_u64.pow(attempts.max(0) as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

/// Handles claimed jobs. Implementations dispatch on the job type and must
/// be idempotent: delivery is at-least-once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, JobError>;

    /// Called once when a job exhausts its attempts (or fails
    /// unrecoverably), so handlers can record terminal state on the rows
    /// the job was driving. Default: nothing.
    async fn on_exhausted(&self, _job: &Job, _error: &str) {}
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub job_timeout_seconds: u64,
    /// Interval in seconds between runs of the stale job reaper. 0 = disabled.
    pub stale_reap_interval_secs: u64,
    /// Grace period before a `running` job is considered stale and reclaimed.
    pub stale_grace_period_secs: i64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            job_timeout_seconds: 600,
            stale_reap_interval_secs: 60,
            stale_grace_period_secs: 600,
        }
    }
}

pub struct JobQueue {
    repository: JobRepository,
    config: JobQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Create a queue and spawn its worker pool.
    pub fn new(
        repository: JobRepository,
        config: JobQueueConfig,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(repo_clone, config_clone, handler, shutdown_rx).await;
        });

        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// Creates a queue that does not spawn a worker. Jobs submitted here are
    /// written to the database and picked up by a real worker elsewhere.
    pub fn new_no_worker(repository: JobRepository, config: JobQueueConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// Submit a typed job to the queue.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit<P: JobPayload>(
        &self,
        payload: &P,
        run_at: Option<DateTime<Utc>>,
        max_attempts: Option<i32>,
    ) -> Result<Uuid> {
        let job = self
            .repository
            .enqueue(
                P::job_type(),
                Job::payload_from(payload),
                EnqueueOptions {
                    run_at,
                    max_attempts,
                },
            )
            .await
            .context("Failed to enqueue job")?;

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Job submitted to queue");

        Ok(job.id)
    }

    async fn worker_pool(
        repository: JobRepository,
        config: JobQueueConfig,
        handler: Arc<dyn JobHandler>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Spawn stale job reaper (if interval > 0)
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stale_reap_interval_secs > 0 {
            let repo_for_reaper = repository.clone();
            let reap_interval = Duration::from_secs(config.stale_reap_interval_secs);
            let grace_period = config.stale_grace_period_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = repo_for_reaper.reap_stale_running(grace_period).await {
                                tracing::error!(error = %e, "Stale job reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(
                        &repository,
                        &config,
                        &semaphore,
                        &handler,
                    ).await;
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        repository: &JobRepository,
        config: &JobQueueConfig,
        semaphore: &Arc<Semaphore>,
        handler: &Arc<dyn JobHandler>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match repository.claim_next().await {
            Ok(Some(job)) => {
                let repo = repository.clone();
                let handler = handler.clone();
                let timeout = Duration::from_secs(config.job_timeout_seconds);

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::run_job(job, repo, handler, timeout).await {
                        tracing::error!(error = %e, "Job processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    #[tracing::instrument(
        skip(repository, handler, timeout),
        fields(job.id = %job.id, job.kind = %job.job_type, job.attempt = job.attempts)
    )]
    async fn run_job(
        job: Job,
        repository: JobRepository,
        handler: Arc<dyn JobHandler>,
        timeout: Duration,
    ) -> Result<()> {
        let result = tokio::time::timeout(timeout, handler.handle(&job)).await;

        match result {
            Ok(Ok(job_result)) => {
                repository
                    .mark_completed(job.id)
                    .await
                    .context("Failed to mark job as completed")?;
                tracing::info!(
                    job_id = %job.id,
                    result = %job_result,
                    "Job completed successfully"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                let unrecoverable = !e.is_recoverable();
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    attempts = job.attempts,
                    max_attempts = job.max_attempts,
                    unrecoverable = unrecoverable,
                    "Job execution failed"
                );

                if unrecoverable || !job.can_retry() {
                    let message = e.to_string();
                    repository
                        .mark_failed(job.id, &message)
                        .await
                        .context("Failed to mark job as failed")?;
                    handler.on_exhausted(&job, &message).await;
                    tracing::error!(job_id = %job.id, "Job abandoned");
                    return Err(e.into_inner());
                }

                let backoff_seconds = compute_retry_backoff_seconds(job.attempts);
                repository
                    .reschedule_retry(job.id, backoff_seconds, &e.to_string())
                    .await
                    .context("Failed to reschedule job")?;
                Ok(())
            }
            Err(_) => {
                tracing::error!(
                    job_id = %job.id,
                    timeout_seconds = timeout.as_secs(),
                    "Job execution timed out"
                );
                if job.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(job.attempts);
                    repository
                        .reschedule_retry(job.id, backoff_seconds, "Job execution timed out")
                        .await?;
                    Ok(())
                } else {
                    repository
                        .mark_failed(job.id, "Job execution timed out")
                        .await?;
                    handler.on_exhausted(&job, "Job execution timed out").await;
                    Err(anyhow::anyhow!("Job execution timed out"))
                }
            }
        }
    }

    /// Signals the worker pool to stop claiming new jobs and exit the main
    /// loop. Returns immediately; already-spawned handlers continue running
    /// until they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(20), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn retry_backoff_handles_negative_attempts() {
        assert_eq!(compute_retry_backoff_seconds(-1), 1);
    }

    #[test]
    fn unrecoverable_job_error_detected() {
        let err = JobError::unrecoverable(anyhow::anyhow!("missing version"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn recoverable_job_error_detected() {
        let err = JobError::recoverable(anyhow::anyhow!("storage blip"));
        assert!(err.is_recoverable());
    }
}
