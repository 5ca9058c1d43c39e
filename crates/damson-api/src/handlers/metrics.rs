//! Operational queue metrics.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use damson_core::AppError;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueMetricsResponse {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/v0/queue/metrics",
    tag = "operations",
    responses(
        (status = 200, description = "Job counts by status", body = QueueMetricsResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn queue_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let stats = state.jobs.stats().await.map_err(AppError::from)?;

    Ok(Json(QueueMetricsResponse {
        pending: stats.pending,
        processing: stats.processing,
        failed: stats.failed,
        timestamp: Utc::now(),
    }))
}
