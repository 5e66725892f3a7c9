//! Ordertrail HTTP API.
//!
//! The binary in `main.rs` wires these pieces to `PostgreSQL`; tests wire
//! them to in-memory stores.

pub mod catch_up;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/orders", routes::orders::router())
        .nest("/api/v1/events", routes::events::router())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
