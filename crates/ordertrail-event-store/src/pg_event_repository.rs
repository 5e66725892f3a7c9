//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use ordertrail_core::error::DomainError;
use ordertrail_core::repository::{
    Committed, EventRepository, EventStream, NewEvent, StoredEvent, StreamHead, run_cancellable,
    validate_batch,
};

/// Unique constraint on `(aggregate_id, version)` in `order_events`.
const STREAM_VERSION_CONSTRAINT: &str = "order_events_stream_version_key";

const SELECT_EVENTS: &str = r"
    SELECT sequence, event_id, aggregate_id, version, event_type,
           occurred_at, payload, correlation_id, causation_id
    FROM order_events
";

/// PostgreSQL-backed event repository.
///
/// Appends run in a `READ COMMITTED` transaction. The version pre-check
/// rejects most stale writers early; the unique `(aggregate_id, version)`
/// constraint decides races between writers that pass it together.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append_in_transaction(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<Committed, DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

        let actual = head_version(&mut *tx, aggregate_id)
            .await
            .map_err(infrastructure)?;
        if actual != expected_version {
            return Err(conflict(aggregate_id, expected_version, actual));
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO order_events \
             (event_id, aggregate_id, version, event_type, occurred_at, payload, \
             correlation_id, causation_id) ",
        );
        qb.push_values((expected_version + 1..).zip(events), |mut b, (version, event)| {
            b.push_bind(event.event_id);
            b.push_bind(aggregate_id);
            b.push_bind(version);
            b.push_bind(event.event_type.clone());
            b.push_bind(event.occurred_at.timestamp());
            b.push_bind(event.payload.clone());
            b.push_bind(event.correlation_id);
            b.push_bind(event.causation_id);
        });
        qb.push(" RETURNING sequence, version");

        let inserted = qb
            .build_query_as::<(i64, i64)>()
            .fetch_all(&mut *tx)
            .await;
        let mut positions = match inserted {
            Ok(rows) => rows,
            Err(err) if is_stream_version_violation(&err) => {
                tx.rollback().await.map_err(infrastructure)?;
                let actual = head_version(&self.pool, aggregate_id)
                    .await
                    .map_err(infrastructure)?;
                return Err(conflict(aggregate_id, expected_version, actual));
            }
            Err(err) => return Err(infrastructure(err)),
        };
        if positions.len() != events.len() {
            return Err(DomainError::Infrastructure(format!(
                "insert returned {} rows for {} events",
                positions.len(),
                events.len()
            )));
        }
        positions.sort_unstable_by_key(|&(_, version)| version);

        tx.commit().await.map_err(infrastructure)?;

        let stored: Vec<StoredEvent> = positions
            .into_iter()
            .zip(events)
            .map(|((sequence, version), event)| {
                let mut record = event.clone().into_stored(sequence, version);
                record.occurred_at = record.occurred_at.trunc_subsecs(0);
                record
            })
            .collect();
        let new_version = stored.last().map_or(expected_version, |e| e.version);
        debug!(%aggregate_id, new_version, "events committed");
        Ok(Committed {
            new_version,
            events: stored,
        })
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip(self, cancel))]
    async fn load_events(
        &self,
        aggregate_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<EventStream, DomainError> {
        run_cancellable(cancel, async {
            let rows = sqlx::query_as::<_, EventRow>(&format!(
                "{SELECT_EVENTS} WHERE aggregate_id = $1 ORDER BY version"
            ))
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
            let events = rows
                .into_iter()
                .map(EventRow::into_stored)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(EventStream::from_events(aggregate_id, events))
        })
        .await
    }

    #[instrument(skip(self, events, cancel), fields(event_count = events.len()))]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
        cancel: &CancellationToken,
    ) -> Result<Committed, DomainError> {
        validate_batch(aggregate_id, expected_version, events)?;
        run_cancellable(
            cancel,
            self.append_in_transaction(aggregate_id, expected_version, events),
        )
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn list_events_by_time(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        run_cancellable(cancel, async {
            let rows = sqlx::query_as::<_, EventRow>(&format!(
                "{SELECT_EVENTS} WHERE occurred_at BETWEEN $1 AND $2 \
                 ORDER BY occurred_at, sequence"
            ))
            .bind(ceil_seconds(from))
            .bind(to.timestamp())
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
            rows.into_iter().map(EventRow::into_stored).collect()
        })
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn stream_heads(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<StreamHead>, DomainError> {
        run_cancellable(cancel, async {
            let rows = sqlx::query_as::<_, (Uuid, i64)>(
                r"
                SELECT aggregate_id, MAX(version)
                FROM order_events
                GROUP BY aggregate_id
                ORDER BY aggregate_id
                ",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
            Ok(rows
                .into_iter()
                .map(|(aggregate_id, version)| StreamHead {
                    aggregate_id,
                    version,
                })
                .collect())
        })
        .await
    }
}

/// Rounds a lower bound up to whole seconds, so a sub-second `from` never
/// admits an event stored at the floor of that second.
fn ceil_seconds(at: DateTime<Utc>) -> i64 {
    at.timestamp() + i64::from(at.timestamp_subsec_nanos() > 0)
}

#[derive(sqlx::FromRow)]
struct EventRow {
    sequence: i64,
    event_id: Uuid,
    aggregate_id: Uuid,
    version: i64,
    event_type: String,
    occurred_at: i64,
    payload: serde_json::Value,
    correlation_id: Uuid,
    causation_id: Uuid,
}

impl EventRow {
    fn into_stored(self) -> Result<StoredEvent, DomainError> {
        let occurred_at = DateTime::from_timestamp(self.occurred_at, 0).ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "event {} has out-of-range timestamp {}",
                self.event_id, self.occurred_at
            ))
        })?;
        Ok(StoredEvent {
            sequence: self.sequence,
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            version: self.version,
            event_type: self.event_type,
            payload: self.payload,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            occurred_at,
        })
    }
}

async fn head_version<'e>(
    executor: impl PgExecutor<'e>,
    aggregate_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(MAX(version), 0) FROM order_events WHERE aggregate_id = $1",
    )
    .bind(aggregate_id)
    .fetch_one(executor)
    .await
}

fn conflict(aggregate_id: Uuid, expected: i64, actual: i64) -> DomainError {
    DomainError::ConcurrencyConflict {
        aggregate_id,
        expected,
        actual,
    }
}

fn is_stream_version_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(STREAM_VERSION_CONSTRAINT)
        }
        _ => false,
    }
}

#[allow(clippy::needless_pass_by_value)]
fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}
