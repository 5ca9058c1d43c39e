//! Application-wide constants.

/// Default expiry for signed URLs handed to clients.
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 300;

/// Bounding box for generated thumbnails (fit within, never upscale).
pub const THUMBNAIL_MAX_DIM: u32 = 400;

/// JPEG quality used when encoding thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// Default maximum delivery attempts for a processing job.
pub const DEFAULT_JOB_MAX_ATTEMPTS: i32 = 5;

/// Offset into a video at which the thumbnail frame is extracted.
pub const VIDEO_THUMBNAIL_OFFSET_SECS: f64 = 1.0;
