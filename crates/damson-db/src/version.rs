use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use damson_core::models::{AssetVersion, ProcessingStatus, VersionPatch};

const VERSION_COLUMNS: &str = r#"
    id,
    asset_id,
    version_number,
    storage_bucket,
    storage_key,
    thumbnail_key,
    content_type,
    file_size,
    checksum,
    metadata,
    processing_status,
    extracted_text,
    page_count,
    duration_seconds,
    width,
    height,
    created_at,
    updated_at
"#;

#[derive(Debug, Clone)]
pub struct NewVersion {
    pub asset_id: Uuid,
    pub storage_bucket: String,
    pub storage_key: String,
    pub thumbnail_key: Option<String>,
    pub content_type: String,
    pub file_size: i64,
    pub checksum: Option<String>,
    pub processing_status: ProcessingStatus,
}

#[derive(Clone)]
pub struct VersionRepository {
    pool: PgPool,
}

impl VersionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the next version of an asset.
    ///
    /// The version number is assigned inside the INSERT
    /// (`COALESCE(MAX(version_number), 0) + 1`) so numbers are append-only
    /// and never reused; the unique index on (asset_id, version_number)
    /// backstops concurrent inserts.
    #[tracing::instrument(skip(self, new_version), fields(asset_id = %new_version.asset_id))]
    pub async fn create(&self, new_version: NewVersion) -> Result<AssetVersion> {
        let version: AssetVersion = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            INSERT INTO asset_versions (
                asset_id, version_number, storage_bucket, storage_key,
                thumbnail_key, content_type, file_size, checksum,
                metadata, processing_status
            )
            VALUES (
                $1,
                (SELECT COALESCE(MAX(version_number), 0) + 1
                   FROM asset_versions WHERE asset_id = $1),
                $2, $3, $4, $5, $6, $7, '{{}}'::jsonb, $8
            )
            RETURNING {VERSION_COLUMNS}
            "#
        ))
        .bind(new_version.asset_id)
        .bind(&new_version.storage_bucket)
        .bind(&new_version.storage_key)
        .bind(&new_version.thumbnail_key)
        .bind(&new_version.content_type)
        .bind(new_version.file_size)
        .bind(&new_version.checksum)
        .bind(new_version.processing_status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert asset version")?;

        tracing::info!(
            version_id = %version.id,
            asset_id = %version.asset_id,
            version_number = version.version_number,
            status = %version.processing_status,
            "Asset version created"
        );

        Ok(version)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, version_id: Uuid) -> Result<Option<AssetVersion>> {
        let version: Option<AssetVersion> = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            SELECT {VERSION_COLUMNS}
            FROM asset_versions
            WHERE id = $1
            "#
        ))
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch asset version")?;

        Ok(version)
    }

    /// Fetch a version only if it belongs to the given asset.
    #[tracing::instrument(skip(self))]
    pub async fn get_for_asset(
        &self,
        asset_id: Uuid,
        version_id: Uuid,
    ) -> Result<Option<AssetVersion>> {
        let version: Option<AssetVersion> = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            SELECT {VERSION_COLUMNS}
            FROM asset_versions
            WHERE asset_id = $1 AND id = $2
            "#
        ))
        .bind(asset_id)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch asset version")?;

        Ok(version)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_for_asset(&self, asset_id: Uuid) -> Result<Vec<AssetVersion>> {
        let versions: Vec<AssetVersion> = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            SELECT {VERSION_COLUMNS}
            FROM asset_versions
            WHERE asset_id = $1
            ORDER BY version_number ASC
            "#
        ))
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list asset versions")?;

        Ok(versions)
    }

    /// Move a version to `processing`, merging diagnostic worker metadata
    /// into its metadata map. Safe to repeat on redelivery.
    #[tracing::instrument(skip(self, worker_meta))]
    pub async fn mark_processing(
        &self,
        version_id: Uuid,
        worker_meta: serde_json::Value,
    ) -> Result<AssetVersion> {
        let version: AssetVersion = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            UPDATE asset_versions
            SET processing_status = 'processing',
                metadata = metadata || $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VERSION_COLUMNS}
            "#
        ))
        .bind(version_id)
        .bind(worker_meta)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark version processing")?;

        Ok(version)
    }

    /// Merge derivative outputs into a version. Only fields present in the
    /// patch are written; metadata entries are merged key-by-key so earlier
    /// diagnostics survive.
    #[tracing::instrument(skip(self, patch))]
    pub async fn apply_patch(&self, version_id: Uuid, patch: VersionPatch) -> Result<AssetVersion> {
        let metadata = serde_json::Value::Object(patch.metadata);

        let version: AssetVersion = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            UPDATE asset_versions
            SET processing_status = COALESCE($2, processing_status),
                thumbnail_key = COALESCE($3, thumbnail_key),
                extracted_text = COALESCE($4, extracted_text),
                page_count = COALESCE($5, page_count),
                duration_seconds = COALESCE($6, duration_seconds),
                width = COALESCE($7, width),
                height = COALESCE($8, height),
                metadata = metadata || $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VERSION_COLUMNS}
            "#
        ))
        .bind(version_id)
        .bind(patch.processing_status)
        .bind(&patch.thumbnail_key)
        .bind(&patch.extracted_text)
        .bind(patch.page_count)
        .bind(patch.duration_seconds)
        .bind(patch.width)
        .bind(patch.height)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .context("Failed to apply version patch")?;

        tracing::debug!(
            version_id = %version_id,
            status = %version.processing_status,
            "Version patch applied"
        );

        Ok(version)
    }

    /// Terminal failure: written only when the owning job exhausts retries.
    #[tracing::instrument(skip(self))]
    pub async fn mark_failed(&self, version_id: Uuid, error: &str) -> Result<Option<AssetVersion>> {
        let meta = serde_json::json!({ "processing_error": error });

        let version: Option<AssetVersion> = sqlx::query_as::<Postgres, AssetVersion>(&format!(
            r#"
            UPDATE asset_versions
            SET processing_status = 'failed',
                metadata = metadata || $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VERSION_COLUMNS}
            "#
        ))
        .bind(version_id)
        .bind(meta)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to mark version failed")?;

        Ok(version)
    }
}
