//! Damson Core Library
//!
//! Core domain models, error types, and configuration shared across all
//! damson components: assets, asset versions, processing jobs, and the
//! pipeline's error taxonomy.

pub mod config;
pub mod constants;
pub mod error;
pub mod job_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::{JobError, JobResultExt};
pub use storage_types::StorageBackend;
