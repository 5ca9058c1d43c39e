//! Version processor: the state machine behind `process_version` jobs.
//!
//! `pending → processing → complete`; every step is safe to repeat because
//! delivery is at-least-once. Thumbnails overwrite a deterministic key,
//! extracted fields are pure overwrites, and status stamps are idempotent.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use damson_core::models::{
    DerivativeKind, Job, JobType, ProcessVersionPayload, ProcessingStatus, VersionPatch,
};
use damson_core::{JobError, JobResultExt};
use damson_db::VersionRepository;
use damson_processing::{DerivativeOutput, StrategyContext, StrategySet};
use damson_storage::{keys, Storage};

use crate::queue::JobHandler;

pub struct VersionProcessor {
    versions: VersionRepository,
    storage: Arc<dyn Storage>,
    strategies: StrategySet,
    strategy_ctx: StrategyContext,
    worker_id: String,
}

impl VersionProcessor {
    pub fn new(
        versions: VersionRepository,
        storage: Arc<dyn Storage>,
        strategy_ctx: StrategyContext,
    ) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let worker_id = format!("{}-{}", host, std::process::id());

        Self {
            versions,
            storage,
            strategies: StrategySet::new(),
            strategy_ctx,
            worker_id,
        }
    }

    async fn process_version(&self, job: &Job) -> Result<serde_json::Value, JobError> {
        let payload: ProcessVersionPayload = job
            .try_payload_as()
            .context("Invalid process_version payload")
            .unrecoverable()?;

        let version = self
            .versions
            .get(payload.version_id)
            .await
            .context("Failed to load version")?
            .ok_or_else(|| {
                JobError::unrecoverable(anyhow::anyhow!(
                    "Version {} does not exist",
                    payload.version_id
                ))
            })?;

        if version.asset_id != payload.asset_id {
            return Err(JobError::unrecoverable(anyhow::anyhow!(
                "Version {} does not belong to asset {}",
                payload.version_id,
                payload.asset_id
            )));
        }

        // Diagnostic stamp only; redelivery overwrites it harmlessly.
        self.versions
            .mark_processing(
                version.id,
                json!({
                    "worker": self.worker_id,
                    "started_at": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await
            .context("Failed to mark version processing")?;

        // A fetch failure is fatal for this attempt; queue-level retry applies.
        let data = self
            .storage
            .get_object(&version.storage_key)
            .await
            .map_err(|e| {
                JobError::recoverable(anyhow::anyhow!(
                    "Failed to fetch original {}: {}",
                    version.storage_key,
                    e
                ))
            })?;

        let kind = DerivativeKind::from_mime(&version.content_type);
        let output = self
            .strategies
            .process(&version.content_type, &data, &self.strategy_ctx)
            .await;

        // Deterministic key: repeated processing overwrites, never accumulates.
        let mut thumbnail_key = None;
        if let Some(ref thumbnail) = output.thumbnail {
            let key = keys::thumbnail_key(version.asset_id, version.id);
            self.storage
                .put_object(&key, thumbnail.to_vec(), "image/jpeg")
                .await
                .map_err(|e| {
                    JobError::recoverable(anyhow::anyhow!(
                        "Failed to store thumbnail {}: {}",
                        key,
                        e
                    ))
                })?;
            thumbnail_key = Some(key);
        }

        let mut patch = build_version_patch(&output, thumbnail_key.clone());
        patch.metadata.insert(
            "completed_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        self.versions
            .apply_patch(version.id, patch)
            .await
            .context("Failed to finalize version")?;

        tracing::info!(
            version_id = %version.id,
            asset_id = %version.asset_id,
            kind = ?kind,
            thumbnail = thumbnail_key.is_some(),
            partial_failures = output.errors.len(),
            "Version processing complete"
        );

        Ok(json!({
            "version_id": version.id,
            "thumbnail": thumbnail_key.is_some(),
            "partial_failures": output.errors.keys().collect::<Vec<_>>(),
        }))
    }
}

#[async_trait]
impl JobHandler for VersionProcessor {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, JobError> {
        match job.job_type {
            JobType::ProcessVersion => self.process_version(job).await,
        }
    }

    /// The job gave up; surface that on the version so it is not stranded
    /// in `processing` forever.
    async fn on_exhausted(&self, job: &Job, error: &str) {
        let Ok(payload) = job.try_payload_as::<ProcessVersionPayload>() else {
            return;
        };
        if let Err(e) = self.versions.mark_failed(payload.version_id, error).await {
            tracing::error!(
                error = %e,
                version_id = %payload.version_id,
                "Failed to mark version failed after job exhaustion"
            );
        }
    }
}

/// Merge a strategy's output into a version patch. Partial failures land in
/// the metadata map under their strategy-specific keys; the version still
/// reaches `complete`.
pub fn build_version_patch(
    output: &DerivativeOutput,
    thumbnail_key: Option<String>,
) -> VersionPatch {
    let mut patch = VersionPatch {
        processing_status: Some(ProcessingStatus::Complete),
        thumbnail_key,
        extracted_text: output.extracted_text.clone(),
        page_count: output.page_count.map(|c| c as i32),
        duration_seconds: output.duration_seconds,
        width: output.width.map(|w| w as i32),
        height: output.height.map(|h| h as i32),
        metadata: serde_json::Map::new(),
    };

    for (key, value) in &output.extra {
        patch.metadata.insert(key.clone(), value.clone());
    }
    for (key, message) in &output.errors {
        patch
            .metadata
            .insert(key.clone(), serde_json::Value::String(message.clone()));
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use damson_processing::{PROBE_ERROR_KEY, TEXT_ERROR_KEY, THUMBNAIL_ERROR_KEY};

    #[test]
    fn test_patch_from_successful_image_output() {
        let output = DerivativeOutput {
            width: Some(2000),
            height: Some(1500),
            thumbnail: Some(Bytes::from_static(b"jpeg")),
            ..Default::default()
        };

        let patch = build_version_patch(&output, Some("a/thumbnails/v.jpg".to_string()));

        assert_eq!(patch.processing_status, Some(ProcessingStatus::Complete));
        assert_eq!(patch.thumbnail_key.as_deref(), Some("a/thumbnails/v.jpg"));
        assert_eq!(patch.width, Some(2000));
        assert_eq!(patch.height, Some(1500));
        assert!(patch.metadata.is_empty());
    }

    #[test]
    fn test_patch_records_partial_failures_and_still_completes() {
        let mut output = DerivativeOutput {
            extracted_text: Some("page one text".to_string()),
            page_count: Some(10),
            ..Default::default()
        };
        output.record_error(THUMBNAIL_ERROR_KEY, "raster tool crashed");

        let patch = build_version_patch(&output, None);

        assert_eq!(
            patch.processing_status,
            Some(ProcessingStatus::Complete),
            "a failed thumbnail must not fail the whole asset"
        );
        assert_eq!(patch.thumbnail_key, None);
        assert_eq!(patch.extracted_text.as_deref(), Some("page one text"));
        assert_eq!(patch.page_count, Some(10));
        assert_eq!(
            patch.metadata.get(THUMBNAIL_ERROR_KEY).and_then(|v| v.as_str()),
            Some("raster tool crashed")
        );
    }

    #[test]
    fn test_patch_carries_probe_extras() {
        let mut output = DerivativeOutput {
            duration_seconds: Some(30.05),
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };
        output
            .extra
            .insert("container_format".to_string(), "mov,mp4,m4a".into());
        output.extra.insert("bit_rate".to_string(), 5_000_000u64.into());

        let patch = build_version_patch(&output, Some("a/thumbnails/v.jpg".to_string()));

        assert_eq!(patch.duration_seconds, Some(30.05));
        assert_eq!(
            patch.metadata.get("container_format").and_then(|v| v.as_str()),
            Some("mov,mp4,m4a")
        );
        assert_eq!(
            patch.metadata.get("bit_rate").and_then(|v| v.as_u64()),
            Some(5_000_000)
        );
    }

    #[test]
    fn test_patch_with_all_error_domains() {
        let mut output = DerivativeOutput::default();
        output.record_error(PROBE_ERROR_KEY, "no stream");
        output.record_error(THUMBNAIL_ERROR_KEY, "no frame");
        output.record_error(TEXT_ERROR_KEY, "no text");

        let patch = build_version_patch(&output, None);

        assert_eq!(patch.processing_status, Some(ProcessingStatus::Complete));
        assert_eq!(patch.metadata.len(), 3);
    }
}
