//! Derivative outputs.

use bytes::Bytes;
use std::collections::BTreeMap;

/// Metadata key for image/PDF/video thumbnail generation failures.
pub const THUMBNAIL_ERROR_KEY: &str = "thumbnail_error";
/// Metadata key for PDF text extraction failures.
pub const TEXT_ERROR_KEY: &str = "text_error";
/// Metadata key for video probe failures.
pub const PROBE_ERROR_KEY: &str = "probe_error";
/// Metadata key noting that a version needed no processing.
pub const PROCESSING_NOTE_KEY: &str = "processing_note";

/// Everything a strategy produced for one version.
///
/// Sub-step failures land in `errors` under a strategy-specific key; the
/// version still completes. All fields are idempotent to recompute: the same
/// input yields the same output, and the thumbnail is written to a
/// deterministic key by the worker.
#[derive(Debug, Default)]
pub struct DerivativeOutput {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub page_count: Option<u32>,
    pub extracted_text: Option<String>,
    /// Encoded thumbnail bytes (JPEG), not yet written to storage.
    pub thumbnail: Option<Bytes>,
    /// Extra probed attributes merged into the version's metadata map
    /// (container format, bitrate, ...).
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Named sub-step failures (`thumbnail_error`, `text_error`,
    /// `probe_error`), merged into the version's metadata map.
    pub errors: BTreeMap<String, String>,
}

impl DerivativeOutput {
    pub fn record_error(&mut self, key: &str, error: impl std::fmt::Display) {
        self.errors.insert(key.to_string(), error.to_string());
    }

    /// No derivative work applies to this content type.
    pub fn unsupported(content_type: &str) -> Self {
        let mut output = Self::default();
        output.extra.insert(
            PROCESSING_NOTE_KEY.to_string(),
            serde_json::Value::String(format!(
                "no processing required for content type {content_type}"
            )),
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error() {
        let mut output = DerivativeOutput::default();
        output.record_error(THUMBNAIL_ERROR_KEY, "decode failed");
        assert_eq!(
            output.errors.get(THUMBNAIL_ERROR_KEY).map(String::as_str),
            Some("decode failed")
        );
    }

    #[test]
    fn test_unsupported_notes_content_type() {
        let output = DerivativeOutput::unsupported("application/zip");
        assert!(output.thumbnail.is_none());
        assert!(output.extracted_text.is_none());
        assert!(output
            .extra
            .get(PROCESSING_NOTE_KEY)
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("application/zip"));
    }
}
