//! Shared key generation for storage backends.
//!
//! Key format: `{asset_id}/{unix_millis}-{sanitized_filename}` for originals,
//! `{asset_id}/thumbnails/{version_id}.jpg` for generated thumbnails. All
//! backends must use this layout for consistency.

use uuid::Uuid;

/// Generate the storage key for an original upload.
///
/// The timestamp prefix keeps concurrent uploads of the same filename from
/// colliding while preserving the original name for download dispositions.
pub fn original_key(asset_id: Uuid, unix_millis: i64, original_filename: &str) -> String {
    format!(
        "{}/{}-{}",
        asset_id,
        unix_millis,
        sanitize_filename(original_filename)
    )
}

/// Generate the deterministic thumbnail key for a version.
///
/// Deterministic on purpose: reprocessing the same version overwrites the
/// same object instead of accumulating garbage.
pub fn thumbnail_key(asset_id: Uuid, version_id: Uuid) -> String {
    format!("{}/thumbnails/{}.jpg", asset_id, version_id)
}

/// Prefix under which every object belonging to an asset lives.
pub fn asset_prefix(asset_id: Uuid) -> String {
    format!("{}/", asset_id)
}

/// Strip path separators and control characters from a client-supplied
/// filename so it can never influence key structure.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches(['.', ' ']).to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_key_layout() {
        let asset_id = Uuid::new_v4();
        let key = original_key(asset_id, 1700000000000, "photo.jpg");
        assert_eq!(key, format!("{}/1700000000000-photo.jpg", asset_id));
    }

    #[test]
    fn test_thumbnail_key_is_deterministic() {
        let asset_id = Uuid::new_v4();
        let version_id = Uuid::new_v4();
        let a = thumbnail_key(asset_id, version_id);
        let b = thumbnail_key(asset_id, version_id);
        assert_eq!(a, b);
        assert_eq!(a, format!("{}/thumbnails/{}.jpg", asset_id, version_id));
    }

    #[test]
    fn test_sanitize_filename_strips_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("dir\\file.txt"), "dir_file.txt");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
    }

    #[test]
    fn test_sanitize_filename_never_empty() {
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn test_asset_prefix_covers_thumbnails() {
        let asset_id = Uuid::new_v4();
        let prefix = asset_prefix(asset_id);
        assert!(original_key(asset_id, 1, "a.png").starts_with(&prefix));
        assert!(thumbnail_key(asset_id, Uuid::new_v4()).starts_with(&prefix));
    }
}
