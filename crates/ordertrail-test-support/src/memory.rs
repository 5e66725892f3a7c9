//! In-memory event log with the same contract as the PostgreSQL store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use ordertrail_core::error::DomainError;
use ordertrail_core::repository::{
    Committed, EventRepository, EventStream, NewEvent, StoredEvent, StreamHead, run_cancellable,
    validate_batch,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Log {
    streams: HashMap<Uuid, Vec<StoredEvent>>,
    next_sequence: i64,
}

/// A thread-safe in-memory event log.
///
/// The version check and the insert happen under one lock, which gives the
/// same all-or-nothing append and compare-and-swap behaviour as the
/// database-backed store. Timestamps are truncated to whole seconds on
/// append, mirroring the persisted form.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    log: Mutex<Log>,
}

impl InMemoryEventRepository {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Log>, DomainError> {
        self.log
            .lock()
            .map_err(|_| DomainError::Infrastructure("in-memory event log poisoned".into()))
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(
        &self,
        aggregate_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<EventStream, DomainError> {
        run_cancellable(cancel, async {
            let log = self.lock()?;
            let events = log.streams.get(&aggregate_id).cloned().unwrap_or_default();
            Ok(EventStream::from_events(aggregate_id, events))
        })
        .await
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
        cancel: &CancellationToken,
    ) -> Result<Committed, DomainError> {
        validate_batch(aggregate_id, expected_version, events)?;
        run_cancellable(cancel, async {
            let mut log = self.lock()?;
            let actual = log
                .streams
                .get(&aggregate_id)
                .and_then(|stream| stream.last())
                .map_or(0, |e| e.version);
            if actual != expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual,
                });
            }

            let mut stored = Vec::with_capacity(events.len());
            for (version, event) in (expected_version + 1..).zip(events) {
                log.next_sequence += 1;
                let mut record = event.clone().into_stored(log.next_sequence, version);
                record.occurred_at = record.occurred_at.trunc_subsecs(0);
                stored.push(record);
            }
            log.streams
                .entry(aggregate_id)
                .or_default()
                .extend(stored.iter().cloned());

            Ok(Committed {
                new_version: expected_version + i64::try_from(stored.len()).unwrap_or(i64::MAX),
                events: stored,
            })
        })
        .await
    }

    async fn list_events_by_time(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        run_cancellable(cancel, async {
            let log = self.lock()?;
            let mut events: Vec<StoredEvent> = log
                .streams
                .values()
                .flatten()
                .filter(|e| e.occurred_at >= from && e.occurred_at <= to)
                .cloned()
                .collect();
            events.sort_by_key(|e| (e.occurred_at, e.sequence));
            Ok(events)
        })
        .await
    }

    async fn stream_heads(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<StreamHead>, DomainError> {
        run_cancellable(cancel, async {
            let log = self.lock()?;
            let mut heads: Vec<StreamHead> = log
                .streams
                .iter()
                .filter_map(|(aggregate_id, stream)| {
                    stream.last().map(|e| StreamHead {
                        aggregate_id: *aggregate_id,
                        version: e.version,
                    })
                })
                .collect();
            heads.sort_by_key(|h| h.aggregate_id);
            Ok(heads)
        })
        .await
    }
}
