//! Image strategy: intrinsic dimensions plus a bounded thumbnail.

use async_trait::async_trait;
use bytes::Bytes;
use image::ImageReader;
use std::io::Cursor;

use damson_core::models::DerivativeKind;

use crate::output::{DerivativeOutput, THUMBNAIL_ERROR_KEY};
use crate::strategy::{DerivativeStrategy, StrategyContext};
use crate::thumbnail::render_thumbnail;

pub struct ImageStrategy;

#[async_trait]
impl DerivativeStrategy for ImageStrategy {
    fn kind(&self) -> DerivativeKind {
        DerivativeKind::Image
    }

    async fn process(&self, data: &[u8], ctx: &StrategyContext) -> DerivativeOutput {
        let mut output = DerivativeOutput::default();

        let bytes = data.to_vec();
        let max_dim = ctx.thumbnail_max_dim;
        let quality = ctx.thumbnail_jpeg_quality;

        // Decode and re-encode are CPU-bound; keep them off the runtime.
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<(u32, u32, Vec<u8>)> {
            let reader = ImageReader::new(Cursor::new(&bytes)).with_guessed_format()?;
            let img = reader.decode()?;
            let (width, height) = image::GenericImageView::dimensions(&img);
            let thumbnail = render_thumbnail(&img, max_dim, quality)?;
            Ok((width, height, thumbnail))
        })
        .await;

        match result {
            Ok(Ok((width, height, thumbnail))) => {
                tracing::debug!(
                    width = width,
                    height = height,
                    thumbnail_bytes = thumbnail.len(),
                    "Image derivatives generated"
                );
                output.width = Some(width);
                output.height = Some(height);
                output.thumbnail = Some(Bytes::from(thumbnail));
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Image thumbnail generation failed");
                output.record_error(THUMBNAIL_ERROR_KEY, e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Image processing task panicked");
                output.record_error(THUMBNAIL_ERROR_KEY, e);
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn ctx() -> StrategyContext {
        StrategyContext {
            thumbnail_max_dim: 400,
            thumbnail_jpeg_quality: 80,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            pdftoppm_path: "pdftoppm".to_string(),
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_large_image_gets_bounded_thumbnail() {
        let data = png_bytes(2000, 2000);
        let output = ImageStrategy.process(&data, &ctx()).await;

        assert_eq!(output.width, Some(2000));
        assert_eq!(output.height, Some(2000));
        assert!(output.errors.is_empty());

        let thumb = output.thumbnail.expect("thumbnail produced");
        assert!(
            thumb.len() < data.len(),
            "thumbnail should be smaller than an original exceeding the box"
        );

        let decoded = image::load_from_memory(&thumb).unwrap();
        let (w, h) = image::GenericImageView::dimensions(&decoded);
        assert!(w <= 400 && h <= 400);
    }

    #[tokio::test]
    async fn test_small_image_is_not_upscaled() {
        let data = png_bytes(100, 60);
        let output = ImageStrategy.process(&data, &ctx()).await;

        let thumb = output.thumbnail.expect("thumbnail produced");
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(image::GenericImageView::dimensions(&decoded), (100, 60));
    }

    #[tokio::test]
    async fn test_invalid_image_records_error_without_failing() {
        let output = ImageStrategy.process(b"not an image", &ctx()).await;

        assert!(output.thumbnail.is_none());
        assert!(output.width.is_none());
        assert!(output.errors.contains_key(THUMBNAIL_ERROR_KEY));
    }

    #[tokio::test]
    async fn test_reprocessing_produces_identical_thumbnail() {
        let data = png_bytes(800, 600);
        let first = ImageStrategy.process(&data, &ctx()).await;
        let second = ImageStrategy.process(&data, &ctx()).await;

        assert_eq!(
            first.thumbnail.as_deref(),
            second.thumbnail.as_deref(),
            "duplicate delivery must converge to the same bytes"
        );
    }
}
