//! Damson Storage Library
//!
//! Storage abstraction and implementations for the asset pipeline: the
//! `Storage` trait plus S3 and local-filesystem backends.
//!
//! # Storage key format
//!
//! All backends use the same key layout, generated by the `keys` module:
//!
//! - **Originals**: `{asset_id}/{unix_millis}-{sanitized_filename}`
//! - **Thumbnails**: `{asset_id}/thumbnails/{version_id}.jpg`
//!
//! Thumbnail keys are deterministic per version so repeated processing
//! overwrites the same object instead of accumulating garbage. Keys must not
//! contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use damson_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{
    ObjectEntry, PutOutcome, SignedUrlOptions, Storage, StorageError, StorageResult,
};
