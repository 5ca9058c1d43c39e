//! Association table replacement.
//!
//! Tags, locales, regions, and audiences are replaced wholesale
//! (delete-then-insert) on every metadata save to match the submitted set.
//! This is deliberately not a diff: insertion timestamps are regenerated on
//! every save, and the O(n) churn is accepted.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use damson_core::models::AssetAssociations;

async fn replace_one(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table: &str,
    column: &str,
    asset_id: Uuid,
    values: &[String],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {table} WHERE asset_id = $1"))
        .bind(asset_id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to clear {table}"))?;

    if !values.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {table} (asset_id, {column}) SELECT $1, UNNEST($2::text[])"
        ))
        .bind(asset_id)
        .bind(values)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to insert into {table}"))?;
    }

    Ok(())
}

/// Replace every association set of an asset in one transaction.
#[tracing::instrument(skip(pool, associations))]
pub async fn replace_associations(
    pool: &PgPool,
    asset_id: Uuid,
    associations: &AssetAssociations,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin association transaction")?;

    replace_one(&mut tx, "asset_tags", "tag", asset_id, &associations.tags).await?;
    replace_one(
        &mut tx,
        "asset_locales",
        "locale",
        asset_id,
        &associations.locales,
    )
    .await?;
    replace_one(
        &mut tx,
        "asset_regions",
        "region",
        asset_id,
        &associations.regions,
    )
    .await?;
    replace_one(
        &mut tx,
        "asset_audiences",
        "audience",
        asset_id,
        &associations.audiences,
    )
    .await?;

    tx.commit()
        .await
        .context("Failed to commit association replacement")?;

    tracing::debug!(
        asset_id = %asset_id,
        tags = associations.tags.len(),
        locales = associations.locales.len(),
        regions = associations.regions.len(),
        audiences = associations.audiences.len(),
        "Associations replaced"
    );

    Ok(())
}
