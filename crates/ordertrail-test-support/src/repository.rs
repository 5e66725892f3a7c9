//! Canned `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordertrail_core::error::DomainError;
use ordertrail_core::repository::{
    Committed, EventRepository, EventStream, NewEvent, StoredEvent, StreamHead,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Commits `events` directly after `expected_version`, numbering each event's
/// sequence after its version.
fn accept_all(expected_version: i64, events: &[NewEvent]) -> Committed {
    let events: Vec<StoredEvent> = (expected_version + 1..)
        .zip(events)
        .map(|(version, event)| event.clone().into_stored(version, version))
        .collect();
    Committed {
        new_version: events.last().map_or(expected_version, |e| e.version),
        events,
    }
}

/// An append call captured by `RecordingEventRepository`.
pub type AppendCall = (Uuid, i64, Vec<NewEvent>);

/// An event repository that records all `append_events` calls. Returns the
/// configured history from `load_events` on every call and accepts every
/// append without a version check.
#[derive(Debug)]
pub struct RecordingEventRepository {
    load_result: Mutex<Vec<StoredEvent>>,
    appended: Mutex<Vec<AppendCall>>,
}

impl RecordingEventRepository {
    /// Serves `load_result` as the history of whichever order is loaded.
    ///
    /// # Panics
    ///
    /// Panics if `load_result` is an `Err`; use `FailingEventRepository` for
    /// error scenarios.
    #[must_use]
    pub fn new(load_result: Result<Vec<StoredEvent>, DomainError>) -> Self {
        Self {
            load_result: Mutex::new(load_result.expect(
                "RecordingEventRepository::new does not accept Err; use FailingEventRepository",
            )),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all events that were appended.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<AppendCall> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(
        &self,
        aggregate_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<EventStream, DomainError> {
        let events = self.load_result.lock().unwrap().clone();
        Ok(EventStream::from_events(aggregate_id, events))
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
        _cancel: &CancellationToken,
    ) -> Result<Committed, DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(accept_all(expected_version, events))
    }

    async fn list_events_by_time(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let events = self.load_result.lock().unwrap().clone();
        Ok(events
            .into_iter()
            .filter(|e| e.occurred_at >= from && e.occurred_at <= to)
            .collect())
    }

    async fn stream_heads(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StreamHead>, DomainError> {
        Ok(Vec::new())
    }
}

/// Every stream is empty and every append succeeds. Covers order creation and
/// commands against unknown orders.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(
        &self,
        aggregate_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<EventStream, DomainError> {
        Ok(EventStream::empty(aggregate_id))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
        _cancel: &CancellationToken,
    ) -> Result<Committed, DomainError> {
        Ok(accept_all(expected_version, events))
    }

    async fn list_events_by_time(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn stream_heads(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StreamHead>, DomainError> {
        Ok(vec![])
    }
}

/// Fails every call with `DomainError::Infrastructure`.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(
        &self,
        _aggregate_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<EventStream, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[NewEvent],
        _cancel: &CancellationToken,
    ) -> Result<Committed, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn list_events_by_time(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn stream_heads(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StreamHead>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
