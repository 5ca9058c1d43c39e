//! Domain models for the asset pipeline.

pub mod asset;
pub mod job;
pub mod rendition;
pub mod version;

pub use asset::{Asset, AssetAssociations};
pub use job::{
    Job, JobPayload, JobStatus, JobType, ProcessVersionPayload, QueueStats,
};
pub use rendition::{DerivativeKind, RenditionKind};
pub use version::{AssetVersion, ProcessingStatus, VersionPatch};
