//! Asset read, archive, and delete handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use damson_core::models::Asset;
use damson_core::AppError;
use damson_storage::keys;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::retrieve::VersionResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct AssetResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub versions: Vec<VersionResponse>,
}

impl AssetResponse {
    fn new(asset: Asset, versions: Vec<VersionResponse>) -> Self {
        Self {
            id: asset.id,
            title: asset.title,
            description: asset.description,
            kind: asset.kind,
            archived: asset.archived,
            created_at: asset.created_at,
            updated_at: asset.updated_at,
            versions,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v0/assets/{id}",
    tag = "assets",
    params(("id" = Uuid, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Asset with versions", body = AssetResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn get_asset(
    Path(asset_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset = state
        .assets
        .get(asset_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;

    let versions = state
        .versions
        .list_for_asset(asset_id)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(VersionResponse::from)
        .collect();

    Ok(Json(AssetResponse::new(asset, versions)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ArchiveRequest {
    pub archived: bool,
}

/// Archived assets reject all retrieval requests with 410 until unarchived.
#[utoipa::path(
    patch,
    path = "/api/v0/assets/{id}/archive",
    tag = "assets",
    params(("id" = Uuid, Path, description = "Asset ID")),
    request_body = ArchiveRequest,
    responses(
        (status = 200, description = "Archived flag updated", body = AssetResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn set_archived(
    Path(asset_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ArchiveRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset = state
        .assets
        .set_archived(asset_id, request.archived)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;

    Ok(Json(AssetResponse::new(asset, Vec::new())))
}

/// Whole-asset deletion: every stored object (originals and thumbnails),
/// all association rows, all version rows, then the asset row.
#[utoipa::path(
    delete,
    path = "/api/v0/assets/{id}",
    tag = "assets",
    params(("id" = Uuid, Path, description = "Asset ID")),
    responses(
        (status = 204, description = "Asset deleted"),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn delete_asset(
    Path(asset_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    state
        .assets
        .get(asset_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;

    // Storage objects go first; object deletes are idempotent, so a retry
    // after a partial failure converges.
    let prefix = keys::asset_prefix(asset_id);
    let objects = state.storage.list(&prefix).await?;
    let object_count = objects.len();
    for entry in objects {
        state.storage.delete_object(&entry.key).await?;
    }

    state.assets.delete(asset_id).await.map_err(AppError::from)?;

    tracing::info!(
        asset_id = %asset_id,
        objects_deleted = object_count,
        "Asset and storage objects deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
