//! Strategy trait and dispatch.
//!
//! One strategy per mime family, selected through `DerivativeKind` so adding
//! a family is a single match arm plus a strategy implementation.

use async_trait::async_trait;

use damson_core::models::DerivativeKind;
use damson_core::Config;

use crate::output::DerivativeOutput;

/// Tool paths and tuning knobs strategies need at runtime.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub thumbnail_max_dim: u32,
    pub thumbnail_jpeg_quality: u8,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub pdftoppm_path: String,
}

impl StrategyContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thumbnail_max_dim: config.thumbnail_max_dim,
            thumbnail_jpeg_quality: config.thumbnail_jpeg_quality,
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            pdftoppm_path: config.pdftoppm_path.clone(),
        }
    }
}

/// A per-mime-family derivative algorithm.
///
/// Implementations never return errors: sub-step failures are captured into
/// the output's error map so a broken thumbnail cannot fail the whole asset.
/// Side effects must be naturally idempotent (deterministic output keys,
/// pure overwrites) because job delivery is at-least-once; this is a hard
/// requirement on any new strategy.
#[async_trait]
pub trait DerivativeStrategy: Send + Sync {
    fn kind(&self) -> DerivativeKind;

    async fn process(&self, data: &[u8], ctx: &StrategyContext) -> DerivativeOutput;
}

/// The full set of strategies, dispatched by content type.
pub struct StrategySet {
    #[cfg(feature = "image")]
    image: crate::image::ImageStrategy,
    #[cfg(feature = "pdf")]
    pdf: crate::pdf::PdfStrategy,
    #[cfg(feature = "video")]
    video: crate::video::VideoStrategy,
}

impl StrategySet {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "image")]
            image: crate::image::ImageStrategy,
            #[cfg(feature = "pdf")]
            pdf: crate::pdf::PdfStrategy,
            #[cfg(feature = "video")]
            video: crate::video::VideoStrategy,
        }
    }

    /// Run the strategy for a content type. Unknown families (or families
    /// compiled out) are a no-op: the version completes with a note and no
    /// derivatives.
    pub async fn process(
        &self,
        content_type: &str,
        data: &[u8],
        ctx: &StrategyContext,
    ) -> DerivativeOutput {
        let kind = DerivativeKind::from_mime(content_type);

        tracing::debug!(
            content_type = %content_type,
            kind = ?kind,
            size_bytes = data.len(),
            "Dispatching derivative strategy"
        );

        match kind {
            #[cfg(feature = "image")]
            DerivativeKind::Image => self.image.process(data, ctx).await,
            #[cfg(feature = "pdf")]
            DerivativeKind::Pdf => self.pdf.process(data, ctx).await,
            #[cfg(feature = "video")]
            DerivativeKind::Video => self.video.process(data, ctx).await,
            _ => DerivativeOutput::unsupported(content_type),
        }
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StrategyContext {
        StrategyContext {
            thumbnail_max_dim: 400,
            thumbnail_jpeg_quality: 80,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            pdftoppm_path: "pdftoppm".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unsupported_mime_is_noop() {
        let set = StrategySet::new();
        let output = set.process("application/zip", b"PK\x03\x04", &ctx()).await;

        assert!(output.thumbnail.is_none());
        assert!(output.extracted_text.is_none());
        assert!(output.errors.is_empty());
        assert!(output.extra.contains_key(crate::PROCESSING_NOTE_KEY));
    }

    #[tokio::test]
    async fn test_text_mime_is_noop() {
        let set = StrategySet::new();
        let output = set.process("text/plain", b"hello", &ctx()).await;
        assert!(output.thumbnail.is_none());
        assert!(output.errors.is_empty());
    }
}
