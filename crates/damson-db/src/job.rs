use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use damson_core::constants::DEFAULT_JOB_MAX_ATTEMPTS;
use damson_core::models::{Job, JobStatus, JobType, QueueStats};

const JOB_COLUMNS: &str = r#"
    id,
    job_type,
    status,
    payload,
    run_at,
    started_at,
    completed_at,
    attempts,
    max_attempts,
    last_error,
    created_at,
    updated_at
"#;

/// Options for enqueuing a job. Default `run_at` is immediate; default
/// `max_attempts` is 5.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub run_at: Option<DateTime<Utc>>,
    pub max_attempts: Option<i32>,
}

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Durably persist a job. The queue guarantees persistence only; no
    /// ordering across job types and at-least-once delivery.
    #[tracing::instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<Job> {
        let run_at = options.run_at.unwrap_or_else(Utc::now);
        let max_attempts = options.max_attempts.unwrap_or(DEFAULT_JOB_MAX_ATTEMPTS);
        let status = if run_at > Utc::now() {
            JobStatus::Scheduled
        } else {
            JobStatus::Pending
        };

        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            INSERT INTO jobs (job_type, status, payload, run_at, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_type.to_string())
        .bind(status)
        .bind(payload)
        .bind(run_at)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert job")?;

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            run_at = %job.run_at,
            "Job enqueued"
        );

        Ok(job)
    }

    /// Atomically claim the next runnable job.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
    /// same row; the claimed job moves to `running` with its attempt counter
    /// incremented in the same transaction.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let job: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status IN ('pending', 'scheduled')
                AND run_at <= NOW()
            ORDER BY run_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next job")?;

        if let Some(job) = job {
            let claimed: Job = sqlx::query_as::<Postgres, Job>(&format!(
                r#"
                UPDATE jobs
                SET status = 'running',
                    started_at = NOW(),
                    attempts = attempts + 1,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {JOB_COLUMNS}
                "#
            ))
            .bind(job.id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to mark job running")?;

            tx.commit().await.context("Failed to commit job claim")?;

            tracing::debug!(
                job_id = %claimed.id,
                job_type = %claimed.job_type,
                attempt = claimed.attempts,
                "Job claimed"
            );

            Ok(Some(claimed))
        } else {
            tx.rollback().await.ok();
            Ok(None)
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_completed(&self, job_id: Uuid) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'completed',
                completed_at = NOW(),
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job completed")?;

        Ok(job)
    }

    /// Reschedule a failed attempt with a backoff delay.
    #[tracing::instrument(skip(self, error))]
    pub async fn reschedule_retry(
        &self,
        job_id: Uuid,
        backoff_seconds: u64,
        error: &str,
    ) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'scheduled',
                run_at = NOW() + make_interval(secs => $2),
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(backoff_seconds as f64)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to reschedule job")?;

        tracing::info!(
            job_id = %job_id,
            backoff_seconds = backoff_seconds,
            "Job retry scheduled"
        );

        Ok(job)
    }

    /// Terminal failure: the job is abandoned and kept for operator
    /// inspection.
    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'failed',
                completed_at = NOW(),
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job failed")?;

        Ok(job)
    }

    /// Return jobs stuck in `running` beyond the grace period to `pending`
    /// for redelivery. Returns the number of reclaimed jobs.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale_running(&self, grace_period_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                run_at = NOW(),
                updated_at = NOW()
            WHERE status = 'running'
                AND started_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(grace_period_secs as f64)
        .execute(&self.pool)
        .await
        .context("Failed to reap stale running jobs")?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            tracing::warn!(reclaimed = reclaimed, "Reclaimed stale running jobs");
        }

        Ok(reclaimed)
    }

    /// Status counts for the operational metrics endpoint. `pending`
    /// includes scheduled retries; `processing` is the running count.
    #[tracing::instrument(skip(self))]
    pub async fn stats(&self) -> Result<QueueStats> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN ('pending', 'scheduled')),
                COUNT(*) FILTER (WHERE status = 'running'),
                COUNT(*) FILTER (WHERE status = 'failed')
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch queue stats")?;

        Ok(QueueStats {
            pending: row.0,
            processing: row.1,
            failed: row.2,
        })
    }
}
