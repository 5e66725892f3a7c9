//! Integration tests for the event log route.

mod common;

use axum::http::StatusCode;
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_events_returns_committed_events_in_order(pool: PgPool) {
    let order_id = Uuid::new_v4();
    common::post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/orders/create",
        &serde_json::json!({ "order_id": order_id, "customer": "alice" }),
    )
    .await;
    common::post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/orders/add-item",
        &serde_json::json!({ "order_id": order_id, "sku": "A", "quantity": 2 }),
    )
    .await;
    // The test clock is fixed at 2026-01-15T10:00:00Z.
    let now = 1_768_471_200_i64;

    let (status, json) = common::get_json(
        common::build_test_app(pool),
        &format!("/api/v1/events?from={}&to={}", now - 60, now + 60),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = json.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "order.created");
    assert_eq!(events[0]["version"], 1);
    assert_eq!(events[1]["event_type"], "order.item_added");
    assert_eq!(events[1]["payload"]["quantity"], 2);
    assert_eq!(events[1]["occurred_at"], now);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_events_outside_range_is_empty(pool: PgPool) {
    let order_id = Uuid::new_v4();
    common::post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/orders/create",
        &serde_json::json!({ "order_id": order_id, "customer": "alice" }),
    )
    .await;

    let (status, json) =
        common::get_json(common::build_test_app(pool), "/api/v1/events?from=0&to=60").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}
