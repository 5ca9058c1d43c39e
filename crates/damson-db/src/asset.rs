use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use damson_core::models::Asset;

const ASSET_COLUMNS: &str = r#"
    id,
    title,
    description,
    kind,
    archived,
    created_by,
    updated_by,
    created_at,
    updated_at
"#;

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub title: String,
    pub description: Option<String>,
    pub kind: String,
    pub created_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, new_asset), fields(title = %new_asset.title))]
    pub async fn create(&self, new_asset: NewAsset) -> Result<Asset> {
        let asset: Asset = sqlx::query_as::<Postgres, Asset>(&format!(
            r#"
            INSERT INTO assets (title, description, kind, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {ASSET_COLUMNS}
            "#
        ))
        .bind(&new_asset.title)
        .bind(&new_asset.description)
        .bind(&new_asset.kind)
        .bind(new_asset.created_by)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert asset")?;

        tracing::info!(asset_id = %asset.id, "Asset created");

        Ok(asset)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, asset_id: Uuid) -> Result<Option<Asset>> {
        let asset: Option<Asset> = sqlx::query_as::<Postgres, Asset>(&format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets
            WHERE id = $1
            "#
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch asset")?;

        Ok(asset)
    }

    /// Update the mutable metadata fields of an existing asset.
    #[tracing::instrument(skip(self, new_asset))]
    pub async fn update_metadata(
        &self,
        asset_id: Uuid,
        new_asset: NewAsset,
    ) -> Result<Option<Asset>> {
        let asset: Option<Asset> = sqlx::query_as::<Postgres, Asset>(&format!(
            r#"
            UPDATE assets
            SET title = $2,
                description = $3,
                kind = $4,
                updated_by = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ASSET_COLUMNS}
            "#
        ))
        .bind(asset_id)
        .bind(&new_asset.title)
        .bind(&new_asset.description)
        .bind(&new_asset.kind)
        .bind(new_asset.created_by)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update asset")?;

        Ok(asset)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_archived(&self, asset_id: Uuid, archived: bool) -> Result<Option<Asset>> {
        let asset: Option<Asset> = sqlx::query_as::<Postgres, Asset>(&format!(
            r#"
            UPDATE assets
            SET archived = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ASSET_COLUMNS}
            "#
        ))
        .bind(asset_id)
        .bind(archived)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update asset archived flag")?;

        Ok(asset)
    }

    /// Delete an asset with its versions and association rows in one
    /// transaction. Storage objects must be removed by the caller first;
    /// this only touches rows.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, asset_id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for asset deletion")?;

        for table in [
            "asset_tags",
            "asset_locales",
            "asset_regions",
            "asset_audiences",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE asset_id = $1"))
                .bind(asset_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to delete rows from {table}"))?;
        }

        sqlx::query("DELETE FROM asset_versions WHERE asset_id = $1")
            .bind(asset_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete asset versions")?;

        let result = sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(asset_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete asset")?;

        tx.commit()
            .await
            .context("Failed to commit asset deletion")?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(asset_id = %asset_id, "Asset deleted");
        }

        Ok(deleted)
    }
}
