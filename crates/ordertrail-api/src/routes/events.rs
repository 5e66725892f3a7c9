//! Routes for reading the event log across orders.

use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use ordertrail_core::error::DomainError;
use ordertrail_orders::application::query_handlers::{self, EventView};
use serde::Deserialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Query string for GET /, in epoch seconds.
#[derive(Debug, Deserialize)]
pub struct TimeRange {
    /// Earliest occurrence time, inclusive.
    pub from: i64,
    /// Latest occurrence time, inclusive.
    pub to: i64,
}

fn instant(seconds: i64, name: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| DomainError::Validation(format!("{name} is out of range: {seconds}")))
}

/// GET /?from=&to=
#[instrument(skip(state))]
async fn list_events(
    State(state): State<AppState>,
    Query(range): Query<TimeRange>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let from = instant(range.from, "from")?;
    let to = instant(range.to, "to")?;
    let deadline = state.deadline();
    let events =
        query_handlers::list_events_by_time(from, to, &*state.event_repository, deadline.token())
            .await?;
    Ok(Json(events))
}

/// Returns the router for the event log.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_events))
}
