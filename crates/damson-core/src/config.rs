//! Configuration module
//!
//! Environment-driven configuration for the API server, storage backends,
//! derivative tooling, and the job queue. Parsed once at startup; invalid
//! combinations fail fast in `validate`.

use std::env;

use crate::constants;
use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...).
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,

    // Ingestion limits
    pub max_file_size_bytes: usize,

    // Retrieval
    pub signed_url_ttl_secs: u64,

    // Derivative generation
    pub thumbnail_max_dim: u32,
    pub thumbnail_jpeg_quality: u8,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub pdftoppm_path: String,

    // Job queue
    pub queue_max_workers: usize,
    pub queue_poll_interval_ms: u64,
    pub queue_max_attempts: i32,
    pub queue_job_timeout_seconds: u64,
    /// Interval in seconds between runs of the stale job reaper. 0 = disabled.
    pub queue_stale_reap_interval_secs: u64,
    /// How long a job may sit in `running` before the reaper returns it to
    /// `pending` for redelivery.
    pub queue_stale_grace_period_secs: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_FILE_SIZE_MB: usize = 500;
        const QUEUE_MAX_WORKERS: usize = 4;
        const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const QUEUE_JOB_TIMEOUT_SECS: u64 = 600;
        const STALE_REAP_INTERVAL_SECS: u64 = 60;
        const STALE_GRACE_PERIOD_SECS: i64 = 600;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(StorageBackend::S3);

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            max_file_size_bytes: env_or("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB) * 1024 * 1024,
            signed_url_ttl_secs: env_or(
                "SIGNED_URL_TTL_SECS",
                constants::DEFAULT_SIGNED_URL_TTL_SECS,
            ),
            thumbnail_max_dim: env_or("THUMBNAIL_MAX_DIM", constants::THUMBNAIL_MAX_DIM),
            thumbnail_jpeg_quality: env_or(
                "THUMBNAIL_JPEG_QUALITY",
                constants::THUMBNAIL_JPEG_QUALITY,
            ),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            pdftoppm_path: env::var("PDFTOPPM_PATH").unwrap_or_else(|_| "pdftoppm".to_string()),
            queue_max_workers: env_or("QUEUE_MAX_WORKERS", QUEUE_MAX_WORKERS),
            queue_poll_interval_ms: env_or("QUEUE_POLL_INTERVAL_MS", QUEUE_POLL_INTERVAL_MS),
            queue_max_attempts: env_or(
                "QUEUE_MAX_ATTEMPTS",
                constants::DEFAULT_JOB_MAX_ATTEMPTS,
            ),
            queue_job_timeout_seconds: env_or("QUEUE_JOB_TIMEOUT_SECS", QUEUE_JOB_TIMEOUT_SECS),
            queue_stale_reap_interval_secs: env_or(
                "STALE_JOB_REAP_INTERVAL_SECS",
                STALE_REAP_INTERVAL_SECS,
            ),
            queue_stale_grace_period_secs: env_or(
                "STALE_JOB_GRACE_PERIOD_SECS",
                STALE_GRACE_PERIOD_SECS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Label recorded as `storage_bucket` on each version: the S3 bucket name
    /// or the local base directory.
    pub fn bucket_label(&self) -> String {
        match self.storage_backend {
            StorageBackend::S3 => self.s3_bucket.clone().unwrap_or_default(),
            StorageBackend::Local => self.local_storage_path.clone().unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.thumbnail_max_dim == 0 {
            return Err(anyhow::anyhow!("THUMBNAIL_MAX_DIM must be greater than 0"));
        }
        if !(1..=100).contains(&self.thumbnail_jpeg_quality) {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_JPEG_QUALITY must be between 1 and 100"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server_port: 4000,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            database_url: "postgresql://localhost/damson".to_string(),
            db_max_connections: 20,
            db_timeout_seconds: 30,
            storage_backend: StorageBackend::Local,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: Some("/tmp/damson".to_string()),
            local_storage_base_url: Some("http://localhost:4000/media".to_string()),
            max_file_size_bytes: 500 * 1024 * 1024,
            signed_url_ttl_secs: 300,
            thumbnail_max_dim: 400,
            thumbnail_jpeg_quality: 80,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            pdftoppm_path: "pdftoppm".to_string(),
            queue_max_workers: 4,
            queue_poll_interval_ms: 1000,
            queue_max_attempts: 5,
            queue_job_timeout_seconds: 600,
            queue_stale_reap_interval_secs: 60,
            queue_stale_grace_period_secs: 600,
        }
    }

    #[test]
    fn test_validate_local_backend_ok() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_s3_backend_requires_bucket() {
        let mut config = base_config();
        config.storage_backend = StorageBackend::S3;
        assert!(config.validate().is_err());

        config.s3_bucket = Some("assets".to_string());
        config.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_database_url() {
        let mut config = base_config();
        config.database_url = "mysql://localhost/damson".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_wildcard_cors_in_production() {
        let mut config = base_config();
        config.environment = "production".to_string();
        assert!(config.validate().is_err());

        config.cors_origins = vec!["https://app.example.com".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_thumbnail_quality_bounds() {
        let mut config = base_config();
        config.thumbnail_jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.thumbnail_jpeg_quality = 101;
        assert!(config.validate().is_err());
        config.thumbnail_jpeg_quality = 80;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bucket_label_per_backend() {
        let mut config = base_config();
        assert_eq!(config.bucket_label(), "/tmp/damson");
        config.storage_backend = StorageBackend::S3;
        config.s3_bucket = Some("assets".to_string());
        assert_eq!(config.bucket_label(), "assets");
    }
}
