//! Ingestion handlers: two-phase init/complete and single-phase multipart.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use damson_core::models::{AssetAssociations, AssetVersion, ProcessingStatus};
use damson_core::AppError;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::services::ingestion::{
    self, CompleteUploadRequest, InitUploadRequest, VersionSource,
};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct InitUploadResponse {
    pub asset_id: Uuid,
    /// Key the client must upload the raw bytes to before calling complete.
    pub storage_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub asset_id: Uuid,
    pub version_id: Uuid,
    pub version_number: i32,
    pub processing_status: ProcessingStatus,
}

impl IngestResponse {
    fn from_version(version: &AssetVersion) -> Self {
        Self {
            asset_id: version.asset_id,
            version_id: version.id,
            version_number: version.version_number,
            processing_status: version.processing_status,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v0/assets/init",
    tag = "ingestion",
    request_body = InitUploadRequest,
    responses(
        (status = 200, description = "Upload initialized", body = InitUploadResponse),
        (status = 400, description = "Missing required fields", body = ErrorResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (asset, storage_key) = ingestion::init_upload(&state, request).await?;

    Ok(Json(InitUploadResponse {
        asset_id: asset.id,
        storage_key,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v0/assets/{id}/complete",
    tag = "ingestion",
    params(("id" = Uuid, Path, description = "Asset ID")),
    request_body = CompleteUploadRequest,
    responses(
        (status = 201, description = "Version created", body = IngestResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn complete_upload(
    Path(asset_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CompleteUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let version = ingestion::complete_upload(&state, asset_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse::from_version(&version)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v0/assets",
    tag = "ingestion",
    responses(
        (status = 201, description = "Asset and version created, processing queued", body = IngestResponse),
        (status = 400, description = "Invalid multipart body", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    )
)]
pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut title = None;
    let mut description = None;
    let mut kind = None;
    let mut associations = AssetAssociations::default();
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(field.text().await?),
            "description" => description = Some(field.text().await?),
            "type" => kind = Some(field.text().await?),
            "tags" => associations.tags.push(field.text().await?),
            "locales" => associations.locales.push(field.text().await?),
            "regions" => associations.regions.push(field.text().await?),
            "audiences" => associations.audiences.push(field.text().await?),
            "file" => {
                let filename = field
                    .file_name()
                    .map(String::from)
                    .ok_or_else(|| AppError::InvalidInput("file part needs a filename".into()))?;
                let content_type = field.content_type().map(String::from).ok_or_else(|| {
                    AppError::InvalidInput("file part needs a content type".into())
                })?;
                let data = field.bytes().await?.to_vec();
                file = Some((filename, content_type, data));
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| AppError::InvalidInput("file part is required".to_string()))?;

    if data.is_empty() {
        return Err(AppError::InvalidInput("file is empty".to_string()).into());
    }
    if data.len() > state.config.max_file_size_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "{} bytes exceeds max {} bytes",
            data.len(),
            state.config.max_file_size_bytes
        ))
        .into());
    }

    let request = InitUploadRequest {
        asset_id: None,
        title: title.unwrap_or_default(),
        description,
        kind: kind.unwrap_or_default(),
        original_filename: filename.clone(),
        content_type: content_type.clone(),
        associations,
        created_by: None,
    };

    let (asset, _placeholder_key) = ingestion::init_upload(&state, request).await?;

    let version = ingestion::create_version(
        &state,
        &asset,
        &content_type,
        VersionSource::Inline {
            original_filename: filename,
            data,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse::from_version(&version)),
    ))
}
