//! Retrieval handlers: signed-URL redirects and version status polling.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use damson_core::models::{AssetVersion, ProcessingStatus, RenditionKind};
use damson_core::AppError;
use damson_storage::SignedUrlOptions;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetrieveQuery {
    pub version: Option<Uuid>,
    pub rendition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetrieveIntent {
    /// Forces a Content-Disposition download filename on the signed URL.
    Download,
    /// Omits the filename so the object renders inline.
    Preview,
}

/// Derive the client-facing filename from a storage key: the final path
/// segment, with the upload-timestamp prefix stripped from original keys.
pub fn download_filename(key: &str) -> String {
    let segment = key.rsplit('/').next().unwrap_or(key);
    match segment.split_once('-') {
        // Millisecond timestamps are at least 10 digits, which also keeps
        // hyphenated UUID thumbnail names intact.
        Some((prefix, rest))
            if prefix.len() >= 10
                && !rest.is_empty()
                && prefix.chars().all(|c| c.is_ascii_digit()) =>
        {
            rest.to_string()
        }
        _ => segment.to_string(),
    }
}

async fn resolve_redirect(
    state: &AppState,
    asset_id: Uuid,
    query: RetrieveQuery,
    intent: RetrieveIntent,
) -> Result<Response, HttpAppError> {
    let version_id = query.version.ok_or_else(|| {
        AppError::InvalidInput("version query parameter is required".to_string())
    })?;

    let rendition = match query.rendition.as_deref() {
        None => RenditionKind::Original,
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("invalid rendition: {raw}")))?,
    };

    let asset = state
        .assets
        .get(asset_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;

    if !asset.is_retrievable() {
        return Err(AppError::Gone("Asset is archived".to_string()).into());
    }

    let version = state
        .versions
        .get_for_asset(asset_id, version_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Version not found".to_string()))?;

    let key = version.rendition_key(rendition).ok_or_else(|| {
        AppError::NotFound("Version has no retrievable rendition".to_string())
    })?;

    let mut options =
        SignedUrlOptions::expiring_in(Duration::from_secs(state.config.signed_url_ttl_secs));
    if intent == RetrieveIntent::Download {
        options = options.with_download_name(download_filename(key));
    }

    let url = state.storage.signed_url(key, options).await?;

    tracing::debug!(
        asset_id = %asset_id,
        version_id = %version_id,
        rendition = %rendition,
        intent = ?intent,
        "Resolved rendition to signed URL"
    );

    let response = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, url)
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/v0/assets/{id}/download",
    tag = "retrieval",
    params(
        ("id" = Uuid, Path, description = "Asset ID"),
        ("version" = Uuid, Query, description = "Version ID"),
        ("rendition" = Option<String>, Query, description = "original | thumbnail")
    ),
    responses(
        (status = 302, description = "Redirect to signed URL with download disposition"),
        (status = 400, description = "Missing version parameter", body = ErrorResponse),
        (status = 404, description = "Asset, version, or rendition not found", body = ErrorResponse),
        (status = 410, description = "Asset is archived", body = ErrorResponse)
    )
)]
pub async fn download_asset(
    Path(asset_id): Path<Uuid>,
    Query(query): Query<RetrieveQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, HttpAppError> {
    resolve_redirect(&state, asset_id, query, RetrieveIntent::Download).await
}

#[utoipa::path(
    get,
    path = "/api/v0/assets/{id}/preview",
    tag = "retrieval",
    params(
        ("id" = Uuid, Path, description = "Asset ID"),
        ("version" = Uuid, Query, description = "Version ID"),
        ("rendition" = Option<String>, Query, description = "original | thumbnail")
    ),
    responses(
        (status = 302, description = "Redirect to signed URL for inline rendering"),
        (status = 400, description = "Missing version parameter", body = ErrorResponse),
        (status = 404, description = "Asset, version, or rendition not found", body = ErrorResponse),
        (status = 410, description = "Asset is archived", body = ErrorResponse)
    )
)]
pub async fn preview_asset(
    Path(asset_id): Path<Uuid>,
    Query(query): Query<RetrieveQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, HttpAppError> {
    resolve_redirect(&state, asset_id, query, RetrieveIntent::Preview).await
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub version_number: i32,
    pub processing_status: ProcessingStatus,
    pub content_type: String,
    pub file_size: i64,
    pub checksum: Option<String>,
    pub has_thumbnail: bool,
    pub extracted_text: Option<String>,
    pub page_count: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AssetVersion> for VersionResponse {
    fn from(version: AssetVersion) -> Self {
        Self {
            id: version.id,
            asset_id: version.asset_id,
            version_number: version.version_number,
            processing_status: version.processing_status,
            content_type: version.content_type,
            file_size: version.file_size,
            checksum: version.checksum,
            has_thumbnail: version.thumbnail_key.is_some(),
            extracted_text: version.extracted_text,
            page_count: version.page_count,
            duration_seconds: version.duration_seconds,
            width: version.width,
            height: version.height,
            metadata: version.metadata,
            created_at: version.created_at,
            updated_at: version.updated_at,
        }
    }
}

/// Processing progress is observable only by polling this endpoint; there
/// is no push notification.
#[utoipa::path(
    get,
    path = "/api/v0/assets/{id}/versions/{version_id}",
    tag = "retrieval",
    params(
        ("id" = Uuid, Path, description = "Asset ID"),
        ("version_id" = Uuid, Path, description = "Version ID")
    ),
    responses(
        (status = 200, description = "Version state", body = VersionResponse),
        (status = 404, description = "Asset or version not found", body = ErrorResponse)
    )
)]
pub async fn get_version(
    Path((asset_id, version_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let version = state
        .versions
        .get_for_asset(asset_id, version_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Version not found".to_string()))?;

    Ok(Json(VersionResponse::from(version)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_filename_strips_timestamp_prefix() {
        let asset_id = Uuid::new_v4();
        let key = format!("{}/1700000000000-quarterly report.pdf", asset_id);
        assert_eq!(download_filename(&key), "quarterly report.pdf");
    }

    #[test]
    fn test_download_filename_thumbnail_key() {
        let version_id = Uuid::new_v4();
        let key = format!("{}/thumbnails/{}.jpg", Uuid::new_v4(), version_id);
        assert_eq!(download_filename(&key), format!("{}.jpg", version_id));
    }

    #[test]
    fn test_download_filename_no_prefix() {
        assert_eq!(download_filename("plain.png"), "plain.png");
        assert_eq!(download_filename("a/b/photo-of-cat.png"), "photo-of-cat.png");
    }
}
