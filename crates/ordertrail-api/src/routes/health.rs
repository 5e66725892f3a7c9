//! Health check endpoints.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Projection health response.
#[derive(Serialize)]
pub struct ProjectionHealthResponse {
    /// `ok` when every summary has caught up with the log, `lagging` otherwise.
    pub status: String,
    /// Number of orders whose summary is behind the log.
    pub lagging_streams: usize,
}

/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health/projection
#[instrument(skip(state))]
async fn projection_health(
    State(state): State<AppState>,
) -> Result<Json<ProjectionHealthResponse>, ApiError> {
    let deadline = state.deadline();
    let lagging = state
        .projector
        .lagging(&*state.event_repository, deadline.token())
        .await?;
    let status = if lagging.is_empty() { "ok" } else { "lagging" };
    Ok(Json(ProjectionHealthResponse {
        status: status.to_string(),
        lagging_streams: lagging.len(),
    }))
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/projection", get(projection_health))
}
