//! Damson DB Library
//!
//! sqlx/Postgres repositories for assets, versions, jobs, and association
//! tables. The pipeline issues plain reads and filtered-equality writes; no
//! cross-table business logic lives here beyond existence/archival checks
//! encoded in the queries themselves.

pub mod asset;
pub mod associations;
pub mod job;
pub mod version;

pub use asset::{AssetRepository, NewAsset};
pub use associations::replace_associations;
pub use job::{EnqueueOptions, JobRepository};
pub use version::{NewVersion, VersionRepository};
