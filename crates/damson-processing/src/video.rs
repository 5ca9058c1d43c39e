//! Video strategy: container probe plus a fixed-offset frame thumbnail.
//!
//! Probing and frame extraction are independent failure domains. Both go
//! through scoped temp files that are removed on every exit path.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use tokio::process::Command;

use damson_core::constants::VIDEO_THUMBNAIL_OFFSET_SECS;
use damson_core::models::DerivativeKind;

use crate::output::{DerivativeOutput, PROBE_ERROR_KEY, THUMBNAIL_ERROR_KEY};
use crate::strategy::{DerivativeStrategy, StrategyContext};
use crate::thumbnail::render_thumbnail;

/// Probed container attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub container_format: Option<String>,
    pub bit_rate: Option<u64>,
}

/// Validate that a tool path doesn't contain shell metacharacters.
fn validate_tool_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Tool path contains dangerous characters: {}", path));
    }
    Ok(())
}

/// Parse ffprobe's JSON output into a [`VideoProbe`]. Pure so it can be
/// tested without the tool installed.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoProbe> {
    let probe: serde_json::Value =
        serde_json::from_slice(stdout).context("Failed to parse ffprobe output")?;

    let stream = probe["streams"]
        .get(0)
        .ok_or_else(|| anyhow!("No video stream found"))?;
    let format = &probe["format"];

    let duration_seconds = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| anyhow!("Could not parse duration"))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| anyhow!("Could not parse width"))? as u32;

    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| anyhow!("Could not parse height"))? as u32;

    let container_format = format["format_name"].as_str().map(String::from);

    let bit_rate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok());

    Ok(VideoProbe {
        duration_seconds,
        width,
        height,
        container_format,
        bit_rate,
    })
}

pub struct VideoStrategy;

#[async_trait]
impl DerivativeStrategy for VideoStrategy {
    fn kind(&self) -> DerivativeKind {
        DerivativeKind::Video
    }

    async fn process(&self, data: &[u8], ctx: &StrategyContext) -> DerivativeOutput {
        let mut output = DerivativeOutput::default();

        // One temp file shared by both tools; dropped on every exit path.
        let input = match self.write_input(data).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to stage video bytes");
                output.record_error(PROBE_ERROR_KEY, &e);
                output.record_error(THUMBNAIL_ERROR_KEY, &e);
                return output;
            }
        };

        match self.probe(input.path(), ctx).await {
            Ok(probe) => {
                tracing::debug!(
                    duration = probe.duration_seconds,
                    width = probe.width,
                    height = probe.height,
                    "Video probe completed"
                );
                output.duration_seconds = Some(probe.duration_seconds);
                output.width = Some(probe.width);
                output.height = Some(probe.height);
                if let Some(format) = probe.container_format {
                    output
                        .extra
                        .insert("container_format".to_string(), format.into());
                }
                if let Some(bit_rate) = probe.bit_rate {
                    output.extra.insert("bit_rate".to_string(), bit_rate.into());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Video probe failed");
                output.record_error(PROBE_ERROR_KEY, e);
            }
        }

        match self.extract_frame(input.path(), ctx).await {
            Ok(thumbnail) => {
                output.thumbnail = Some(Bytes::from(thumbnail));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Video frame extraction failed");
                output.record_error(THUMBNAIL_ERROR_KEY, e);
            }
        }

        output
    }
}

impl VideoStrategy {
    async fn write_input(&self, data: &[u8]) -> Result<tempfile::NamedTempFile> {
        let file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(file.path(), data).await?;
        Ok(file)
    }

    #[tracing::instrument(skip(self, ctx), fields(tool = "ffprobe"))]
    async fn probe(&self, input: &Path, ctx: &StrategyContext) -> Result<VideoProbe> {
        validate_tool_path(&ctx.ffprobe_path)?;
        let start = std::time::Instant::now();

        let result = Command::new(&ctx.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(input)
            .output()
            .await
            .context("Failed to execute ffprobe")?;

        if !result.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&result.stderr)
            ));
        }

        let probe = parse_probe_output(&result.stdout)?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "ffprobe finished"
        );

        Ok(probe)
    }

    /// Extract the frame at the fixed offset into a scoped temp dir, then
    /// pipe it through the shared thumbnail step.
    #[tracing::instrument(skip(self, ctx), fields(tool = "ffmpeg"))]
    async fn extract_frame(&self, input: &Path, ctx: &StrategyContext) -> Result<Vec<u8>> {
        validate_tool_path(&ctx.ffmpeg_path)?;

        let workdir = tempfile::tempdir()?;
        let frame_path = workdir.path().join("frame.jpg");

        let result = Command::new(&ctx.ffmpeg_path)
            .args(["-y", "-ss", &VIDEO_THUMBNAIL_OFFSET_SECS.to_string(), "-i"])
            .arg(input)
            .args(["-frames:v", "1"])
            .arg(&frame_path)
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !result.status.success() {
            return Err(anyhow!(
                "ffmpeg frame extraction failed: {}",
                String::from_utf8_lossy(&result.stderr)
            ));
        }

        let frame = tokio::fs::read(&frame_path).await?;

        let max_dim = ctx.thumbnail_max_dim;
        let quality = ctx.thumbnail_jpeg_quality;
        let thumbnail = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let img = image::load_from_memory(&frame)?;
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
    fn test_parse_probe_output_full() {
        let json = br#"{
            "streams": [{"width": 1920, "height": 1080, "codec_name": "h264"}],
            "format": {"duration": "30.05", "format_name": "mov,mp4,m4a", "bit_rate": "5000000"}
        }"#;

        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.width, 1920);
        assert_eq!(probe.height, 1080);
        assert!((probe.duration_seconds - 30.05).abs() < f64::EPSILON);
        assert_eq!(probe.container_format.as_deref(), Some("mov,mp4,m4a"));
        assert_eq!(probe.bit_rate, Some(5_000_000));
    }

    #[test]
    fn test_parse_probe_output_optional_fields_absent() {
        let json = br#"{
            "streams": [{"width": 640, "height": 480}],
            "format": {"duration": "2.0"}
        }"#;

        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.container_format, None);
        assert_eq!(probe.bit_rate, None);
    }

    #[test]
    fn test_parse_probe_output_no_stream() {
        let json = br#"{"streams": [], "format": {"duration": "2.0"}}"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_probe_output_missing_duration() {
        let json = br#"{"streams": [{"width": 640, "height": 480}], "format": {}}"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_probe_output_invalid_json() {
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_validate_tool_path() {
        assert!(validate_tool_path("/usr/bin/ffmpeg").is_ok());
        assert!(validate_tool_path("ffmpeg").is_ok());
        assert!(validate_tool_path("ffmpeg; rm -rf /").is_err());
        assert!(validate_tool_path("ffmpeg`id`").is_err());
    }

    #[tokio::test]
    async fn test_missing_tools_record_both_error_domains() {
        let ctx = StrategyContext {
            thumbnail_max_dim: 400,
            thumbnail_jpeg_quality: 80,
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ffprobe_path: "/nonexistent/ffprobe".to_string(),
            pdftoppm_path: "pdftoppm".to_string(),
        };

        let output = VideoStrategy.process(b"\x00\x00\x00\x18ftypmp42", &ctx).await;

        assert!(output.errors.contains_key(PROBE_ERROR_KEY));
        assert!(output.errors.contains_key(THUMBNAIL_ERROR_KEY));
        assert!(output.thumbnail.is_none());
        assert!(output.duration_seconds.is_none());
    }
}
