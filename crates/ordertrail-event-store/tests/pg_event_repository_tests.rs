//! Integration tests for `PgEventRepository`.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ordertrail_core::error::DomainError;
use ordertrail_core::repository::{EventRepository, NewEvent, StreamHead};
use ordertrail_event_store::PgEventRepository;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Helper to build a `NewEvent` with sensible defaults.
fn make_new_event(aggregate_id: Uuid, occurred_at: DateTime<Utc>) -> NewEvent {
    NewEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        event_type: "order.item_added".to_string(),
        payload: serde_json::json!({"order_id": aggregate_id, "sku": "A", "quantity": 1}),
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at,
    }
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).unwrap()
}

// --- load_events ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_events_returns_empty_stream_for_nonexistent_aggregate(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let stream = repo
        .load_events(Uuid::new_v4(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(stream.is_empty());
    assert_eq!(stream.version, 0);
}

// --- append_events + load_events round-trip ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_and_load_single_event(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let aggregate_id = Uuid::new_v4();
    let occurred_at = at(12) + TimeDelta::milliseconds(750);
    let event = make_new_event(aggregate_id, occurred_at);

    let committed = repo
        .append_events(aggregate_id, 0, std::slice::from_ref(&event), &cancel)
        .await
        .unwrap();

    assert_eq!(committed.new_version, 1);
    let stream = repo.load_events(aggregate_id, &cancel).await.unwrap();
    assert_eq!(stream.version, 1);
    assert_eq!(stream.events.len(), 1);
    let e = &stream.events[0];
    assert_eq!(e.event_id, event.event_id);
    assert_eq!(e.aggregate_id, aggregate_id);
    assert_eq!(e.version, 1);
    assert_eq!(e.event_type, event.event_type);
    assert_eq!(e.payload, event.payload);
    assert_eq!(e.correlation_id, event.correlation_id);
    assert_eq!(e.causation_id, event.causation_id);
    assert_eq!(e.occurred_at, at(12));
    assert_eq!(e.sequence, committed.events[0].sequence);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_successive_appends_concatenate_in_version_order(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let aggregate_id = Uuid::new_v4();
    let first = vec![
        make_new_event(aggregate_id, at(10)),
        make_new_event(aggregate_id, at(10)),
    ];
    let second = vec![make_new_event(aggregate_id, at(11))];

    repo.append_events(aggregate_id, 0, &first, &cancel)
        .await
        .unwrap();
    let committed = repo
        .append_events(aggregate_id, 2, &second, &cancel)
        .await
        .unwrap();

    assert_eq!(committed.new_version, 3);
    let stream = repo.load_events(aggregate_id, &cancel).await.unwrap();
    let versions: Vec<i64> = stream.events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    let ids: Vec<Uuid> = stream.events.iter().map(|e| e.event_id).collect();
    let expected: Vec<Uuid> = first.iter().chain(&second).map(|e| e.event_id).collect();
    assert_eq!(ids, expected);
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_expected_version_returns_conflict_and_writes_nothing(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let aggregate_id = Uuid::new_v4();
    repo.append_events(aggregate_id, 0, &[make_new_event(aggregate_id, at(10))], &cancel)
        .await
        .unwrap();

    let result = repo
        .append_events(
            aggregate_id,
            0,
            &[
                make_new_event(aggregate_id, at(11)),
                make_new_event(aggregate_id, at(11)),
            ],
            &cancel,
        )
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: id,
            expected,
            actual,
        }) => {
            assert_eq!(id, aggregate_id);
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    let stream = repo.load_events(aggregate_id, &cancel).await.unwrap();
    assert_eq!(stream.version, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_expected_version_ahead_of_stream_returns_conflict(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();

    let result = repo
        .append_events(
            aggregate_id,
            5,
            &[make_new_event(aggregate_id, at(10))],
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict { actual: 0, .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_appends_with_same_expected_version_have_one_winner(pool: PgPool) {
    let aggregate_id = Uuid::new_v4();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let repo = PgEventRepository::new(pool.clone());
            let batch = vec![
                make_new_event(aggregate_id, at(10)),
                make_new_event(aggregate_id, at(10)),
            ];
            tokio::spawn(async move {
                repo.append_events(aggregate_id, 0, &batch, &CancellationToken::new())
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(committed) => {
                assert_eq!(committed.new_version, 2);
                winners += 1;
            }
            Err(DomainError::ConcurrencyConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 5);
    let stream = PgEventRepository::new(pool)
        .load_events(aggregate_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stream.events.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_losing_insert_race_reports_committed_version(pool: PgPool) {
    let aggregate_id = Uuid::new_v4();
    let mut rival = pool.begin().await.unwrap();
    sqlx::query(
        "INSERT INTO order_events \
         (event_id, aggregate_id, version, event_type, occurred_at, payload, \
          correlation_id, causation_id) \
         VALUES ($1, $2, 1, 'order.created', 0, '{}', $3, $3)",
    )
    .bind(Uuid::new_v4())
    .bind(aggregate_id)
    .bind(Uuid::new_v4())
    .execute(&mut *rival)
    .await
    .unwrap();

    // The rival row is invisible to the version pre-check, so the append
    // blocks on the unique index until the rival commits.
    let repo = PgEventRepository::new(pool.clone());
    let append = tokio::spawn(async move {
        repo.append_events(
            aggregate_id,
            0,
            &[make_new_event(aggregate_id, at(10))],
            &CancellationToken::new(),
        )
        .await
    });
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(!append.is_finished());
    rival.commit().await.unwrap();

    let result = append.await.unwrap();
    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 0,
            actual: 1,
            ..
        })
    ));
    let stream = PgEventRepository::new(pool)
        .load_events(aggregate_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stream.events.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_different_aggregates_do_not_interfere(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    repo.append_events(a, 0, &[make_new_event(a, at(10))], &cancel)
        .await
        .unwrap();
    repo.append_events(b, 0, &[make_new_event(b, at(10))], &cancel)
        .await
        .unwrap();

    assert_eq!(repo.load_events(a, &cancel).await.unwrap().version, 1);
    assert_eq!(repo.load_events(b, &cancel).await.unwrap().version, 1);
}

// --- validation and cancellation ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_empty_batch_is_rejected(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let result = repo
        .append_events(Uuid::new_v4(), 0, &[], &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(DomainError::Validation(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_cancelled_append_writes_nothing(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = repo
        .append_events(aggregate_id, 0, &[make_new_event(aggregate_id, at(10))], &cancel)
        .await;

    assert!(matches!(result, Err(DomainError::Cancelled)));
    let stream = repo
        .load_events(aggregate_id, &CancellationToken::new())
        .await
        .unwrap();
    assert!(stream.is_empty());
}

// --- list_events_by_time ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_events_by_time_is_inclusive_and_ordered(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    repo.append_events(a, 0, &[make_new_event(a, at(9)), make_new_event(a, at(12))], &cancel)
        .await
        .unwrap();
    repo.append_events(b, 0, &[make_new_event(b, at(10)), make_new_event(b, at(13))], &cancel)
        .await
        .unwrap();

    let events = repo.list_events_by_time(at(9), at(12), &cancel).await.unwrap();

    let seen: Vec<(Uuid, i64)> = events.iter().map(|e| (e.aggregate_id, e.version)).collect();
    assert_eq!(seen, vec![(a, 1), (b, 1), (a, 2)]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_events_by_time_with_inverted_range_is_empty(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let a = Uuid::new_v4();
    repo.append_events(a, 0, &[make_new_event(a, at(10))], &cancel)
        .await
        .unwrap();

    let events = repo.list_events_by_time(at(11), at(9), &cancel).await.unwrap();

    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_events_by_time_sub_second_from_excludes_earlier_second(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let aggregate_id = Uuid::new_v4();
    repo.append_events(
        aggregate_id,
        0,
        &[
            make_new_event(aggregate_id, at(10)),
            make_new_event(aggregate_id, at(10) + TimeDelta::seconds(1)),
        ],
        &cancel,
    )
    .await
    .unwrap();

    let events = repo
        .list_events_by_time(at(10) + TimeDelta::milliseconds(500), at(11), &cancel)
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].version, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_events_by_time_orders_ties_by_sequence(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    repo.append_events(b, 0, &[make_new_event(b, at(10))], &cancel)
        .await
        .unwrap();
    repo.append_events(a, 0, &[make_new_event(a, at(10))], &cancel)
        .await
        .unwrap();

    let events = repo.list_events_by_time(at(10), at(10), &cancel).await.unwrap();

    let ids: Vec<Uuid> = events.iter().map(|e| e.aggregate_id).collect();
    assert_eq!(ids, vec![b, a]);
    assert!(events[0].sequence < events[1].sequence);
}

// --- stream_heads ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_stream_heads_report_latest_version_per_aggregate(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let cancel = CancellationToken::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    repo.append_events(a, 0, &[make_new_event(a, at(10)), make_new_event(a, at(10))], &cancel)
        .await
        .unwrap();
    repo.append_events(b, 0, &[make_new_event(b, at(10))], &cancel)
        .await
        .unwrap();

    let heads = repo.stream_heads(&cancel).await.unwrap();

    assert_eq!(heads.len(), 2);
    assert!(heads.contains(&StreamHead {
        aggregate_id: a,
        version: 2
    }));
    assert!(heads.contains(&StreamHead {
        aggregate_id: b,
        version: 1
    }));
}
