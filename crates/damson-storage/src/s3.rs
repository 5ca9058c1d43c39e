use crate::traits::{
    ObjectEntry, PutOutcome, SignedUrlOptions, Storage, StorageError, StorageResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

/// S3 storage implementation
///
/// Works against AWS S3 and S3-compatible providers (MinIO, DigitalOcean
/// Spaces, ...) via an optional custom endpoint with path-style addressing.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(ref endpoint) = endpoint_url {
            // S3-compatible providers generally require path-style requests.
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        Ok(S3Storage { client, bucket })
    }

    fn validate_key(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<PutOutcome> {
        Self::validate_key(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let resp = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 put failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(PutOutcome {
            key: key.to_string(),
            etag: resp.e_tag().map(str::to_string),
        })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        Self::validate_key(key)?;
        let start = std::time::Instant::now();

        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                tracing::error!(
                    error = %service_err,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 get failed"
                );
                return Err(StorageError::DownloadFailed(service_err.to_string()));
            }
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes();

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );

        Ok(bytes.to_vec())
    }

    async fn signed_url(&self, key: &str, options: SignedUrlOptions) -> StorageResult<String> {
        Self::validate_key(key)?;

        // Never hand out a URL that can only 404.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let presigning = PresigningConfig::expires_in(options.expires_in)
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(ref name) = options.download_name {
            let safe_name = name.replace(['"', '\r', '\n'], "_");
            request = request
                .response_content_disposition(format!("attachment; filename=\"{}\"", safe_name));
        }

        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        Self::validate_key(key)?;
        let start = std::time::Instant::now();

        // S3 DeleteObject succeeds for missing keys, which matches the
        // idempotent contract.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::BackendError(e.to_string()))?;
            for object in page.contents() {
                entries.push(ObjectEntry {
                    key: object.key().unwrap_or_default().to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }
        }

        Ok(entries)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::BackendError(service_err.to_string()))
                }
            }
        }
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
