//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ordertrail_core::clock::Clock;
use ordertrail_event_store::PgEventRepository;
use ordertrail_read_model::{PgSummaryStore, SummaryProjector};
use ordertrail_test_support::FixedClock;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ordertrail_api::build_router;
use ordertrail_api::state::AppState;

/// 2026-01-15T10:00:00Z, the `occurred_at` of every event the tests write.
pub fn fixed_clock() -> Arc<dyn Clock + Send + Sync> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the application state over `PostgreSQL` with a fixed clock.
pub fn build_test_state(pool: PgPool) -> AppState {
    let event_repository = Arc::new(PgEventRepository::new(pool.clone()));
    let projector = SummaryProjector::new(Arc::new(PgSummaryStore::new(pool)));
    AppState::new(
        fixed_clock(),
        event_repository,
        projector,
        Duration::from_secs(5),
        CancellationToken::new(),
    )
}

/// The router `main.rs` serves, over `build_test_state`.
pub fn build_test_app(pool: PgPool) -> Router {
    build_router(build_test_state(pool))
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}
