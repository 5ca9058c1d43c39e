use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// A named view of a version, resolved to a storage key at retrieval time.
/// Never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenditionKind {
    #[default]
    Original,
    Thumbnail,
}

impl FromStr for RenditionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" => Ok(RenditionKind::Original),
            "thumbnail" => Ok(RenditionKind::Thumbnail),
            _ => Err(anyhow::anyhow!("Invalid rendition: {}", s)),
        }
    }
}

impl Display for RenditionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RenditionKind::Original => write!(f, "original"),
            RenditionKind::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

/// Derivative strategy family, derived once from a version's content type.
/// Adding a new family is a single match arm here plus a strategy
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivativeKind {
    Image,
    Pdf,
    Video,
    Unsupported,
}

impl DerivativeKind {
    /// Classify a MIME type into its processing family.
    pub fn from_mime(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();

        if mime == "application/pdf" {
            DerivativeKind::Pdf
        } else if mime.starts_with("image/") {
            DerivativeKind::Image
        } else if mime.starts_with("video/") {
            DerivativeKind::Video
        } else {
            DerivativeKind::Unsupported
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendition_round_trip() {
        assert_eq!(
            "original".parse::<RenditionKind>().unwrap(),
            RenditionKind::Original
        );
        assert_eq!(
            "Thumbnail".parse::<RenditionKind>().unwrap(),
            RenditionKind::Thumbnail
        );
        assert_eq!(RenditionKind::Thumbnail.to_string(), "thumbnail");
        assert!("preview".parse::<RenditionKind>().is_err());
    }

    #[test]
    fn test_derivative_kind_from_mime() {
        assert_eq!(DerivativeKind::from_mime("image/jpeg"), DerivativeKind::Image);
        assert_eq!(DerivativeKind::from_mime("image/png"), DerivativeKind::Image);
        assert_eq!(
            DerivativeKind::from_mime("application/pdf"),
            DerivativeKind::Pdf
        );
        assert_eq!(DerivativeKind::from_mime("video/mp4"), DerivativeKind::Video);
        assert_eq!(
            DerivativeKind::from_mime("video/quicktime"),
            DerivativeKind::Video
        );
        assert_eq!(
            DerivativeKind::from_mime("application/zip"),
            DerivativeKind::Unsupported
        );
        assert_eq!(
            DerivativeKind::from_mime("text/plain"),
            DerivativeKind::Unsupported
        );
    }

    #[test]
    fn test_derivative_kind_ignores_mime_parameters() {
        assert_eq!(
            DerivativeKind::from_mime("IMAGE/JPEG; charset=binary"),
            DerivativeKind::Image
        );
        assert_eq!(
            DerivativeKind::from_mime("application/pdf; name=report.pdf"),
            DerivativeKind::Pdf
        );
    }
}
