use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Named job families the worker knows how to dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text"))]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ProcessVersion,
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobType::ProcessVersion => write!(f, "process_version"),
        }
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process_version" => Ok(JobType::ProcessVersion),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_status", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Scheduled => write!(f, "scheduled"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "scheduled" => Ok(JobStatus::Scheduled),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// A durable queue entry. Delivery is at-least-once: handlers must be
/// idempotent (deterministic output keys, pure status overwrites).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Job {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Job {
            id: row.get("id"),
            job_type: row.get::<String, _>("job_type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse job_type: {}", e).into())
            })?,
            status: row.get("status"),
            payload: row.get("payload"),
            run_at: row.get("run_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Job {
    pub fn is_ready_to_run(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Scheduled)
            && self.run_at <= Utc::now()
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: JobPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Create a payload value from a typed struct.
    pub fn payload_from<P: JobPayload>(payload: &P) -> serde_json::Value {
        serde_json::to_value(payload).unwrap_or_default()
    }
}

/// Trait for type-safe job payloads
pub trait JobPayload: Serialize + for<'de> Deserialize<'de> {
    fn job_type() -> JobType;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessVersionPayload {
    pub asset_id: Uuid,
    pub version_id: Uuid,
}

impl JobPayload for ProcessVersionPayload {
    fn job_type() -> JobType {
        JobType::ProcessVersion
    }
}

/// Queue status counts for the operational metrics endpoint.
#[derive(Debug, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, attempts: i32, max_attempts: i32, run_at: DateTime<Utc>) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: JobType::ProcessVersion,
            status,
            payload: serde_json::json!({}),
            run_at,
            started_at: None,
            completed_at: None,
            attempts,
            max_attempts,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_job_type_round_trip() {
        assert_eq!(JobType::ProcessVersion.to_string(), "process_version");
        assert_eq!(
            "process_version".parse::<JobType>().unwrap(),
            JobType::ProcessVersion
        );
        assert!("transcode".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Scheduled,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_ready_to_run() {
        let past = Utc::now() - chrono::Duration::seconds(10);
        let future = Utc::now() + chrono::Duration::seconds(3600);
        assert!(job(JobStatus::Pending, 0, 5, past).is_ready_to_run());
        assert!(job(JobStatus::Scheduled, 0, 5, past).is_ready_to_run());
        assert!(!job(JobStatus::Scheduled, 0, 5, future).is_ready_to_run());
        assert!(!job(JobStatus::Running, 0, 5, past).is_ready_to_run());
        assert!(!job(JobStatus::Completed, 0, 5, past).is_ready_to_run());
    }

    #[test]
    fn test_job_can_retry() {
        let now = Utc::now();
        assert!(job(JobStatus::Failed, 2, 5, now).can_retry());
        assert!(!job(JobStatus::Failed, 5, 5, now).can_retry());
        assert!(!job(JobStatus::Failed, 7, 5, now).can_retry());
    }

    #[test]
    fn test_typed_payload_round_trip() {
        let payload = ProcessVersionPayload {
            asset_id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
        };
        let mut j = job(JobStatus::Pending, 0, 5, Utc::now());
        j.payload = Job::payload_from(&payload);

        let parsed: ProcessVersionPayload = j.try_payload_as().unwrap();
        assert_eq!(parsed.asset_id, payload.asset_id);
        assert_eq!(parsed.version_id, payload.version_id);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let mut j = job(JobStatus::Pending, 0, 5, Utc::now());
        j.payload = serde_json::json!({"asset_id": "not-a-uuid"});
        assert!(j.try_payload_as::<ProcessVersionPayload>().is_err());
    }
}
