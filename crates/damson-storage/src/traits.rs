//! Storage abstraction trait
//!
//! Defines the `Storage` trait that all storage backends must implement.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a successful put.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub key: String,
    pub etag: Option<String>,
}

/// Options for generating a signed download URL.
///
/// When `download_name` is set the URL forces a `Content-Disposition`
/// attachment with that filename; omitting it signals inline rendering for
/// preview use cases.
#[derive(Debug, Clone, Default)]
pub struct SignedUrlOptions {
    pub expires_in: Duration,
    pub download_name: Option<String>,
}

impl SignedUrlOptions {
    pub fn expiring_in(expires_in: Duration) -> Self {
        Self {
            expires_in,
            download_name: None,
        }
    }

    pub fn with_download_name(mut self, name: impl Into<String>) -> Self {
        self.download_name = Some(name.into());
        self
    }
}

/// One object returned from a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait so
/// the pipeline can work with any backend without coupling to vendor SDKs.
/// Writes are either append-only (new keys) or idempotent overwrites of
/// deterministic keys, so implementations must be safe for concurrent use by
/// multiple worker instances without additional locking.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an object, overwriting any existing object at the same key.
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<PutOutcome>;

    /// Read an object's bytes. Fails with `NotFound` if absent.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Generate a time-limited signed URL for direct client access.
    ///
    /// Fails with `NotFound` if the underlying object is missing, so callers
    /// never hand out URLs that can only 404.
    async fn signed_url(&self, key: &str, options: SignedUrlOptions) -> StorageResult<String>;

    /// Delete an object. Idempotent: deleting a missing object succeeds.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Enumerate objects under a key prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend(&self) -> StorageBackend;
}
