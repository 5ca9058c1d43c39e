//! Shared thumbnail resize and encode step.
//!
//! Every strategy that produces a thumbnail (image originals, PDF page
//! rasters, video frames) pipes it through this module so all thumbnails fit
//! the same bounding box and encoding.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

/// Compute the target dimensions to fit within a square bounding box while
/// preserving aspect ratio. Never upscales: images already inside the box
/// keep their dimensions.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }

    let scale = (max_dim as f64 / width as f64).min(max_dim as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Select a resampling filter based on how aggressively we downscale.
/// Heavier downscales tolerate cheaper filters.
pub fn select_filter(orig_width: u32, orig_height: u32, new_width: u32, new_height: u32) -> FilterType {
    let width_ratio = orig_width as f32 / new_width as f32;
    let height_ratio = orig_height as f32 / new_height as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        FilterType::Triangle
    } else if max_ratio > 1.5 {
        FilterType::CatmullRom
    } else {
        FilterType::Lanczos3
    }
}

/// Resize into the bounding box (no upscaling) and encode as JPEG at the
/// given quality. Alpha is flattened by the RGB conversion.
pub fn render_thumbnail(img: &DynamicImage, max_dim: u32, quality: u8) -> Result<Vec<u8>> {
    let (orig_width, orig_height) = img.dimensions();
    let (target_width, target_height) = fit_within(orig_width, orig_height, max_dim);

    let resized = if (target_width, target_height) == (orig_width, orig_height) {
        img.clone()
    } else {
        let filter = select_filter(orig_width, orig_height, target_width, target_height);
        img.resize_exact(target_width, target_height, filter)
    };

    encode_jpeg(&resized, quality)
}

/// Encode an image as JPEG at the given quality.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
    rgb.write_with_encoder(encoder)
        .context("Failed to encode thumbnail as JPEG")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([200, 30, 30, 255]),
        ))
    }

    #[test]
    fn test_fit_within_no_upscale() {
        assert_eq!(fit_within(100, 50, 400), (100, 50));
        assert_eq!(fit_within(400, 400, 400), (400, 400));
    }

    #[test]
    fn test_fit_within_downscales_preserving_aspect() {
        assert_eq!(fit_within(2000, 2000, 400), (400, 400));
        assert_eq!(fit_within(2000, 1000, 400), (400, 200));
        assert_eq!(fit_within(1000, 2000, 400), (200, 400));
    }

    #[test]
    fn test_fit_within_never_zero() {
        let (w, h) = fit_within(10000, 3, 400);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_select_filter_by_ratio() {
        assert_eq!(select_filter(2000, 2000, 400, 400), FilterType::Triangle);
        assert_eq!(select_filter(700, 700, 400, 400), FilterType::CatmullRom);
        assert_eq!(select_filter(500, 500, 400, 400), FilterType::Lanczos3);
    }

    #[test]
    fn test_render_thumbnail_downscales_large_image() {
        let img = test_image(2000, 1000);
        let jpeg = render_thumbnail(&img, 400, 80).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (400, 200));
    }

    #[test]
    fn test_render_thumbnail_keeps_small_image_dimensions() {
        let img = test_image(120, 80);
        let jpeg = render_thumbnail(&img, 400, 80).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (120, 80));
    }

    #[test]
    fn test_render_thumbnail_output_is_jpeg() {
        let jpeg = render_thumbnail(&test_image(500, 500), 400, 80).unwrap();
        // JPEG SOI marker
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_render_thumbnail_is_deterministic() {
        let img = test_image(800, 600);
        let a = render_thumbnail(&img, 400, 80).unwrap();
        let b = render_thumbnail(&img, 400, 80).unwrap();
        assert_eq!(a, b);
    }
}
