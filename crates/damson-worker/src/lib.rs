//! Damson Worker Library
//!
//! The background half of the pipeline: a Postgres-backed job queue worker
//! pool and the version processor that drives each asset version through
//! `pending → processing → complete`.

pub mod processor;
pub mod queue;

pub use processor::{build_version_patch, VersionProcessor};
pub use queue::{JobHandler, JobQueue, JobQueueConfig};
