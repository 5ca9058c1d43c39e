use crate::traits::{
    ObjectEntry, PutOutcome, SignedUrlOptions, Storage, StorageError, StorageResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Used for development and as the managed-store alternative to S3. Signed
/// URLs are pseudo-signed: the expiry and download filename travel as query
/// parameters for the static file server in front of `base_path` to honor.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for object storage (e.g., "/var/lib/damson/objects")
    /// * `base_url` - Base URL for serving objects (e.g., "http://localhost:4000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Validates that the storage key doesn't contain path traversal
    /// sequences that could escape the base storage directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        Ok(self.base_path.join(key))
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Walk the tree under `dir` collecting file entries with keys relative
    /// to the storage root.
    async fn collect_entries(&self, dir: PathBuf, entries: &mut Vec<ObjectEntry>) -> StorageResult<()> {
        let mut stack = vec![dir];

        while let Some(current) = stack.pop() {
            let mut read_dir = match fs::read_dir(&current).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::BackendError(e.to_string())),
            };

            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::BackendError(e.to_string()))?;

                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let meta = entry
                        .metadata()
                        .await
                        .map_err(|e| StorageError::BackendError(e.to_string()))?;
                    let key = path
                        .strip_prefix(&self.base_path)
                        .map_err(|e| StorageError::BackendError(e.to_string()))?
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    entries.push(ObjectEntry {
                        key,
                        size: meta.len(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<PutOutcome> {
        let path = self.key_to_path(key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(PutOutcome {
            key: key.to_string(),
            etag: None,
        })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage get successful"
        );

        Ok(data)
    }

    async fn signed_url(&self, key: &str, options: SignedUrlOptions) -> StorageResult<String> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let expires_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|now| now.as_secs() + options.expires_in.as_secs())
            .unwrap_or(0);
        let mut url = format!("{}?expires={}", self.generate_url(key), expires_at);

        if let Some(ref name) = options.download_name {
            url.push_str(&format!(
                "&filename={}",
                utf8_percent_encode(name, NON_ALPHANUMERIC)
            ));
        }

        Ok(url)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        if prefix.contains("..") || prefix.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Prefix contains invalid characters".to_string(),
            ));
        }

        // A prefix may name a directory or a partial filename; walk the
        // deepest existing directory and filter by the full prefix.
        let mut entries = Vec::new();
        let search_root = {
            let candidate = self.base_path.join(prefix);
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                candidate
            } else {
                candidate
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.base_path.clone())
            }
        };

        self.collect_entries(search_root, &mut entries).await?;
        entries.retain(|e| e.key.starts_with(prefix));
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(entries)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use uuid::Uuid;

    async fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(dir.path(), "http://localhost:4000/media".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let data = b"test data".to_vec();
        let outcome = storage
            .put_object("a/1-test.txt", data.clone(), "text/plain")
            .await
            .unwrap();

        assert_eq!(outcome.key, "a/1-test.txt");

        let downloaded = storage.get_object("a/1-test.txt").await.unwrap();
        assert_eq!(data, downloaded);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let result = storage.get_object("missing.bin").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let result = storage.get_object("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete_object("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        assert!(storage.delete_object("nonexistent/file.txt").await.is_ok());

        storage
            .put_object("x/file.txt", b"data".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(storage.delete_object("x/file.txt").await.is_ok());
        assert!(storage.delete_object("x/file.txt").await.is_ok());
        assert!(!storage.exists("x/file.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        storage
            .put_object("thumb.jpg", b"first".to_vec(), "image/jpeg")
            .await
            .unwrap();
        storage
            .put_object("thumb.jpg", b"second".to_vec(), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(storage.get_object("thumb.jpg").await.unwrap(), b"second");

        let entries = storage.list("thumb").await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_signed_url_missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let result = storage
            .signed_url(
                "missing.png",
                SignedUrlOptions::expiring_in(Duration::from_secs(300)),
            )
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_signed_url_with_download_name() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        storage
            .put_object("a/photo.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();

        let url = storage
            .signed_url(
                "a/photo.png",
                SignedUrlOptions::expiring_in(Duration::from_secs(300))
                    .with_download_name("My Photo.png"),
            )
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:4000/media/a/photo.png?expires="));
        assert!(url.contains("filename=My%20Photo%2Epng"));

        let inline = storage
            .signed_url(
                "a/photo.png",
                SignedUrlOptions::expiring_in(Duration::from_secs(300)),
            )
            .await
            .unwrap();
        assert!(!inline.contains("filename="));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;
        let asset_id = Uuid::new_v4();

        storage
            .put_object(
                &format!("{}/1-a.png", asset_id),
                b"aaaa".to_vec(),
                "image/png",
            )
            .await
            .unwrap();
        storage
            .put_object(
                &format!("{}/thumbnails/v.jpg", asset_id),
                b"bb".to_vec(),
                "image/jpeg",
            )
            .await
            .unwrap();
        storage
            .put_object("other/1-b.png", b"cc".to_vec(), "image/png")
            .await
            .unwrap();

        let entries = storage.list(&format!("{}/", asset_id)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.key.starts_with(&asset_id.to_string())));
        assert_eq!(
            entries.iter().map(|e| e.size).sum::<u64>(),
            6,
            "sizes come from file metadata"
        );
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let entries = storage.list("nothing/here/").await.unwrap();
        assert!(entries.is_empty());
    }
}
