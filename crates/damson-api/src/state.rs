//! Shared application state.

use std::sync::Arc;

use damson_core::Config;
use damson_db::{AssetRepository, JobRepository, VersionRepository};
use damson_storage::Storage;
use damson_worker::JobQueue;

pub struct AppState {
    pub config: Config,
    pub assets: AssetRepository,
    pub versions: VersionRepository,
    pub jobs: JobRepository,
    pub storage: Arc<dyn Storage>,
    pub queue: JobQueue,
    pub pool: sqlx::PgPool,
}
