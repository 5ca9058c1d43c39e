//! PDF strategy: text + page count extraction and a first-page thumbnail.
//!
//! Text extraction and rasterization are independent failure domains: an
//! unreadable first page must not cost the extracted text, and vice versa.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;

use damson_core::models::DerivativeKind;

use crate::output::{DerivativeOutput, TEXT_ERROR_KEY, THUMBNAIL_ERROR_KEY};
use crate::strategy::{DerivativeStrategy, StrategyContext};
use crate::thumbnail::render_thumbnail;

pub struct PdfStrategy;

/// Pull the page count out of the `/Count` entry of the page tree.
///
/// A full parse is unnecessary for a single integer; scanning for the
/// largest `/Count` value handles nested page tree nodes.
pub fn scan_page_count(data: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(data);
    text.split("/Count")
        .skip(1)
        .filter_map(|s| {
            let num: String = s
                .chars()
                .skip_while(|c| c.is_whitespace())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            num.parse::<u32>().ok()
        })
        .max()
}

#[async_trait]
impl DerivativeStrategy for PdfStrategy {
    fn kind(&self) -> DerivativeKind {
        DerivativeKind::Pdf
    }

    async fn process(&self, data: &[u8], ctx: &StrategyContext) -> DerivativeOutput {
        let mut output = DerivativeOutput::default();

        output.page_count = scan_page_count(data);

        // Text extraction pass over the whole document.
        let text_bytes = data.to_vec();
        let text_result =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&text_bytes))
                .await;

        match text_result {
            Ok(Ok(text)) => {
                tracing::debug!(chars = text.len(), "PDF text extracted");
                output.extracted_text = Some(text);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "PDF text extraction failed");
                output.record_error(TEXT_ERROR_KEY, e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "PDF text extraction task panicked");
                output.record_error(TEXT_ERROR_KEY, e);
            }
        }

        // First-page raster, independent of the text pass.
        match self.rasterize_first_page(data, ctx).await {
            Ok(thumbnail) => {
                output.thumbnail = Some(Bytes::from(thumbnail));
            }
            Err(e) => {
                tracing::warn!(error = %e, "PDF thumbnail generation failed");
                output.record_error(THUMBNAIL_ERROR_KEY, e);
            }
        }

        output
    }
}

impl PdfStrategy {
    /// Rasterize page 1 with `pdftoppm` into a scoped temp dir, then pipe
    /// the raster through the shared thumbnail step. The temp dir is removed
    /// on every exit path by RAII.
    async fn rasterize_first_page(
        &self,
        data: &[u8],
        ctx: &StrategyContext,
    ) -> anyhow::Result<Vec<u8>> {
        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join("input.pdf");
        let output_prefix = workdir.path().join("page");

        tokio::fs::write(&input_path, data).await?;

        let result = Command::new(&ctx.pdftoppm_path)
            .args(["-jpeg", "-f", "1", "-l", "1", "-r", "150", "-singlefile"])
            .arg(&input_path)
            .arg(&output_prefix)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to execute pdftoppm: {}", e))?;

        if !result.status.success() {
            return Err(anyhow::anyhow!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&result.stderr)
            ));
        }

        let raster = tokio::fs::read(workdir.path().join("page.jpg")).await?;

        let max_dim = ctx.thumbnail_max_dim;
        let quality = ctx.thumbnail_jpeg_quality;
        let thumbnail = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let img = image::load_from_memory(&raster)?;
            render_thumbnail(&img, max_dim, quality)
        })
        .await??;

        Ok(thumbnail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_page_count_simple() {
        let pdf = b"%PDF-1.4\n/Type /Pages /Count 5\n";
        assert_eq!(scan_page_count(pdf), Some(5));
    }

    #[test]
    fn test_scan_page_count_takes_largest_node() {
        // Nested page tree: intermediate nodes carry partial counts.
        let pdf = b"%PDF-1.4\n/Count 3\n/Count 10\n/Count 7\n";
        assert_eq!(scan_page_count(pdf), Some(10));
    }

    #[test]
    fn test_scan_page_count_missing() {
        assert_eq!(scan_page_count(b"%PDF-1.4\n"), None);
        assert_eq!(scan_page_count(b"not a pdf"), None);
    }

    #[tokio::test]
    async fn test_garbage_input_records_errors_without_failing() {
        let ctx = StrategyContext {
            thumbnail_max_dim: 400,
            thumbnail_jpeg_quality: 80,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            // A tool path that cannot exist, so the raster step fails fast.
            pdftoppm_path: "/nonexistent/pdftoppm".to_string(),
        };

        let output = PdfStrategy.process(b"definitely not a pdf", &ctx).await;

        assert!(output.thumbnail.is_none());
        assert!(output.errors.contains_key(THUMBNAIL_ERROR_KEY));
        // The text domain fails (or yields text) independently; either way
        // processing did not abort.
        assert!(output.extracted_text.is_some() || output.errors.contains_key(TEXT_ERROR_KEY));
    }
}
