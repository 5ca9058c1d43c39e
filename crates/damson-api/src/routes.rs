//! Router assembly.

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{assets, ingest, metrics, retrieve};
use crate::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Leave headroom above the raw file size for multipart framing.
    let body_limit = state.config.max_file_size_bytes + 1024 * 1024;
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/api/v0/assets", post(ingest::upload_asset))
        .route("/api/v0/assets/init", post(ingest::init_upload))
        .route(
            "/api/v0/assets/{id}",
            get(assets::get_asset).delete(assets::delete_asset),
        )
        .route("/api/v0/assets/{id}/complete", post(ingest::complete_upload))
        .route("/api/v0/assets/{id}/archive", patch(assets::set_archived))
        .route("/api/v0/assets/{id}/download", get(retrieve::download_asset))
        .route("/api/v0/assets/{id}/preview", get(retrieve::preview_asset))
        .route(
            "/api/v0/assets/{id}/versions/{version_id}",
            get(retrieve::get_version),
        )
        .route("/api/v0/queue/metrics", get(metrics::queue_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
