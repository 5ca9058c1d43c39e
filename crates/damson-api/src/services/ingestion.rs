//! Ingestion service.
//!
//! Both ingestion variants (two-phase direct-to-storage and single-phase
//! multipart) funnel into one `create_version` operation, parameterized by
//! whether the bytes were already placed by the caller. This keeps
//! validation and association handling from drifting apart between paths.

use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use damson_core::models::{
    Asset, AssetAssociations, AssetVersion, ProcessVersionPayload, ProcessingStatus, VersionPatch,
};
use damson_core::AppError;
use damson_db::{replace_associations, NewAsset, NewVersion};
use damson_storage::keys;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InitUploadRequest {
    /// When set, a new version is being added to an existing asset.
    pub asset_id: Option<Uuid>,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "type is required"))]
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(length(min = 1, message = "original filename is required"))]
    pub original_filename: String,
    #[validate(length(min = 1, message = "content type is required"))]
    pub content_type: String,
    #[serde(flatten)]
    pub associations: AssetAssociations,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteUploadRequest {
    #[validate(length(min = 1, message = "storage key is required"))]
    pub storage_key: String,
    #[validate(length(min = 1, message = "content type is required"))]
    pub content_type: String,
    pub file_size: Option<i64>,
    pub checksum: Option<String>,
    /// Base64-encoded client-generated thumbnail. When present the version
    /// is created `complete` and background processing is skipped.
    pub thumbnail_data: Option<String>,
}

/// Where the version's bytes come from.
pub enum VersionSource {
    /// Bytes already placed by the caller (two-phase upload). An optional
    /// client-generated thumbnail skips background processing entirely.
    Placed {
        storage_key: String,
        file_size: i64,
        checksum: Option<String>,
        client_thumbnail: Option<Vec<u8>>,
    },
    /// Bytes supplied in this call (single-phase upload); the service
    /// writes them before creating the version row.
    Inline {
        original_filename: String,
        data: Vec<u8>,
    },
}

/// Create or update the asset for an init request, replacing its
/// association sets with the submitted ones, and hand back the storage key
/// the client should upload to.
pub async fn init_upload(
    state: &AppState,
    request: InitUploadRequest,
) -> Result<(Asset, String), HttpAppError> {
    request.validate().map_err(AppError::from)?;

    let new_asset = NewAsset {
        title: request.title,
        description: request.description,
        kind: request.kind,
        created_by: request.created_by,
    };

    let asset = match request.asset_id {
        Some(asset_id) => state
            .assets
            .update_metadata(asset_id, new_asset)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?,
        None => state.assets.create(new_asset).await.map_err(AppError::from)?,
    };

    replace_associations(&state.pool, asset.id, &request.associations)
        .await
        .map_err(AppError::from)?;

    let storage_key = keys::original_key(
        asset.id,
        chrono::Utc::now().timestamp_millis(),
        &request.original_filename,
    );

    Ok((asset, storage_key))
}

/// Finish a two-phase upload: the client has already placed the bytes.
pub async fn complete_upload(
    state: &AppState,
    asset_id: Uuid,
    request: CompleteUploadRequest,
) -> Result<AssetVersion, HttpAppError> {
    request.validate().map_err(AppError::from)?;

    let asset = state
        .assets
        .get(asset_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;

    let client_thumbnail = match request.thumbnail_data {
        Some(ref encoded) => Some(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| {
                    AppError::InvalidInput(format!("thumbnail_data is not valid base64: {}", e))
                })?,
        ),
        None => None,
    };

    create_version(
        state,
        &asset,
        &request.content_type,
        VersionSource::Placed {
            storage_key: request.storage_key,
            file_size: request.file_size.unwrap_or(0),
            checksum: request.checksum,
            client_thumbnail,
        },
    )
    .await
}

/// The unified version creation operation.
///
/// - Inline bytes are written through the Storage Adapter first (with a
///   SHA-256 checksum).
/// - A version row is created with the next version number.
/// - With a client-supplied thumbnail the version is `complete` immediately
///   and nothing is queued; otherwise it starts `pending` and a
///   `process_version` job is enqueued.
pub async fn create_version(
    state: &AppState,
    asset: &Asset,
    content_type: &str,
    source: VersionSource,
) -> Result<AssetVersion, HttpAppError> {
    let bucket = state.config.bucket_label();

    let (storage_key, file_size, checksum, client_thumbnail) = match source {
        VersionSource::Placed {
            storage_key,
            file_size,
            checksum,
            client_thumbnail,
        } => (storage_key, file_size, checksum, client_thumbnail),
        VersionSource::Inline {
            original_filename,
            data,
        } => {
            let storage_key = keys::original_key(
                asset.id,
                chrono::Utc::now().timestamp_millis(),
                &original_filename,
            );
            let file_size = data.len() as i64;
            let checksum = format!("{:x}", Sha256::digest(&data));

            state
                .storage
                .put_object(&storage_key, data, content_type)
                .await?;

            (storage_key, file_size, Some(checksum), None)
        }
    };

    let initial_status = if client_thumbnail.is_some() {
        ProcessingStatus::Complete
    } else {
        ProcessingStatus::Pending
    };

    let version = state
        .versions
        .create(NewVersion {
            asset_id: asset.id,
            storage_bucket: bucket,
            storage_key,
            thumbnail_key: None,
            content_type: content_type.to_string(),
            file_size,
            checksum,
            processing_status: initial_status,
        })
        .await
        .map_err(AppError::from)?;

    let version = match client_thumbnail {
        Some(thumbnail) => {
            // The caller already produced the derivative; record it at the
            // deterministic key and skip queuing.
            let thumb_key = keys::thumbnail_key(asset.id, version.id);
            state
                .storage
                .put_object(&thumb_key, thumbnail, "image/jpeg")
                .await?;

            state
                .versions
                .apply_patch(
                    version.id,
                    VersionPatch {
                        thumbnail_key: Some(thumb_key),
                        ..Default::default()
                    },
                )
                .await
                .map_err(AppError::from)?
        }
        None => {
            state
                .queue
                .submit(
                    &ProcessVersionPayload {
                        asset_id: asset.id,
                        version_id: version.id,
                    },
                    None,
                    Some(state.config.queue_max_attempts),
                )
                .await
                .map_err(AppError::from)?;
            version
        }
    };

    tracing::info!(
        asset_id = %asset.id,
        version_id = %version.id,
        version_number = version.version_number,
        status = %version.processing_status,
        "Version ingested"
    );

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_request_requires_title() {
        let request = InitUploadRequest {
            asset_id: None,
            title: "".to_string(),
            description: None,
            kind: "image".to_string(),
            original_filename: "logo.png".to_string(),
            content_type: "image/png".to_string(),
            associations: AssetAssociations::default(),
            created_by: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_init_request_requires_content_type() {
        let request = InitUploadRequest {
            asset_id: None,
            title: "Logo".to_string(),
            description: None,
            kind: "image".to_string(),
            original_filename: "logo.png".to_string(),
            content_type: "".to_string(),
            associations: AssetAssociations::default(),
            created_by: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_init_request_valid() {
        let request = InitUploadRequest {
            asset_id: None,
            title: "Logo".to_string(),
            description: Some("Corporate logo".to_string()),
            kind: "image".to_string(),
            original_filename: "logo.png".to_string(),
            content_type: "image/png".to_string(),
            associations: AssetAssociations {
                tags: vec!["brand".to_string()],
                ..Default::default()
            },
            created_by: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_complete_request_requires_storage_key() {
        let request = CompleteUploadRequest {
            storage_key: "".to_string(),
            content_type: "image/png".to_string(),
            file_size: None,
            checksum: None,
            thumbnail_data: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_init_request_parses_type_field_and_associations() {
        let request: InitUploadRequest = serde_json::from_value(serde_json::json!({
            "title": "Logo",
            "type": "image",
            "original_filename": "logo.png",
            "content_type": "image/png",
            "tags": ["brand", "2026"],
            "locales": ["en-US"]
        }))
        .unwrap();

        assert_eq!(request.kind, "image");
        assert_eq!(request.associations.tags.len(), 2);
        assert_eq!(request.associations.locales, vec!["en-US".to_string()]);
        assert!(request.associations.regions.is_empty());
    }
}
