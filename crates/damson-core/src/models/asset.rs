use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// A logical file entity. An asset owns one or more monotonically numbered
/// versions; the binary contents live in object storage, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Asset {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Free-form type classification supplied by the caller ("image",
    /// "document", "video", ...). Not authoritative for processing; dispatch
    /// uses the version's content type.
    pub kind: String,
    pub archived: bool,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Archived assets must reject new retrieval requests.
    pub fn is_retrievable(&self) -> bool {
        !self.archived
    }
}

/// Many-to-many association sets replaced wholesale on every metadata save.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AssetAssociations {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub audiences: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(archived: bool) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            title: "Logo".to_string(),
            description: None,
            kind: "image".to_string(),
            archived,
            created_by: None,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_archived_asset_not_retrievable() {
        assert!(asset(false).is_retrievable());
        assert!(!asset(true).is_retrievable());
    }
}
