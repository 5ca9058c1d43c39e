use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::rendition::RenditionKind;

/// Lifecycle state of a version's background processing.
///
/// `pending → processing → complete`; `failed` is written only when the
/// owning job exhausts its attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "processing_status", rename_all = "lowercase")
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Complete => write!(f, "complete"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "complete" => Ok(ProcessingStatus::Complete),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid processing status: {}", s)),
        }
    }
}

/// One immutable uploaded binary for an asset plus its derived artifacts.
///
/// `storage_key` never changes after creation; derivatives land in separate
/// fields (`thumbnail_key`) so reprocessing overwrites rather than mutates
/// the original. The worker is the sole writer after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AssetVersion {
    pub id: Uuid,
    pub asset_id: Uuid,
    /// Unique per asset, increasing, starting at 1. Never reused.
    pub version_number: i32,
    pub storage_bucket: String,
    pub storage_key: String,
    pub thumbnail_key: Option<String>,
    pub content_type: String,
    pub file_size: i64,
    pub checksum: Option<String>,
    /// Free-form diagnostic map: worker identity, strategy error keys,
    /// completion stamps. Not authoritative for correctness.
    pub metadata: JsonValue,
    pub processing_status: ProcessingStatus,
    pub extracted_text: Option<String>,
    pub page_count: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetVersion {
    /// Resolve a rendition to a storage key. A thumbnail request falls back
    /// to the original when no thumbnail exists; `None` means neither key is
    /// present.
    pub fn rendition_key(&self, rendition: RenditionKind) -> Option<&str> {
        match rendition {
            RenditionKind::Thumbnail => self
                .thumbnail_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .or(Some(self.storage_key.as_str()).filter(|k| !k.is_empty())),
            RenditionKind::Original => {
                Some(self.storage_key.as_str()).filter(|k| !k.is_empty())
            }
        }
    }
}

/// Fields the worker merges into a version when an attempt finishes.
/// `metadata` entries are merged key-by-key into the existing map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPatch {
    pub processing_status: Option<ProcessingStatus>,
    pub thumbnail_key: Option<String>,
    pub extracted_text: Option<String>,
    pub page_count: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub metadata: serde_json::Map<String, JsonValue>,
}
