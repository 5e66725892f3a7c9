//! Event log abstraction.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DomainError;

/// An event that has been built by an aggregate but not yet persisted.
///
/// Versions and storage sequence numbers are assigned by the log at append
/// time, so they are absent here.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// When the fact occurred.
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    /// Converts into the persisted form at the given position.
    #[must_use]
    pub fn into_stored(self, sequence: i64, version: i64) -> StoredEvent {
        StoredEvent {
            sequence,
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            version,
            event_type: self.event_type,
            payload: self.payload,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            occurred_at: self.occurred_at,
        }
    }
}

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Storage-assigned global sequence number.
    pub sequence: i64,
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// 1-based position within the aggregate stream.
    pub version: i64,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// When the fact occurred, at whole-second resolution.
    pub occurred_at: DateTime<Utc>,
}

/// All events of one aggregate, ordered by version, with the latest version.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    /// The aggregate the stream belongs to.
    pub aggregate_id: Uuid,
    /// Events in ascending version order.
    pub events: Vec<StoredEvent>,
    /// Version of the last event, or 0 for an empty stream.
    pub version: i64,
}

impl EventStream {
    /// An empty stream at version 0.
    #[must_use]
    pub fn empty(aggregate_id: Uuid) -> Self {
        Self {
            aggregate_id,
            events: Vec::new(),
            version: 0,
        }
    }

    /// Builds a stream from events already sorted by version.
    #[must_use]
    pub fn from_events(aggregate_id: Uuid, events: Vec<StoredEvent>) -> Self {
        let version = events.last().map_or(0, |e| e.version);
        Self {
            aggregate_id,
            events,
            version,
        }
    }

    /// Returns `true` if no event has ever been appended to the stream.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// The result of a successful append.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// The stream version after the append.
    pub new_version: i64,
    /// The events as persisted, in version order.
    pub events: Vec<StoredEvent>,
}

/// The latest version of one non-empty stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHead {
    /// The aggregate the stream belongs to.
    pub aggregate_id: Uuid,
    /// Version of the last event in the stream.
    pub version: i64,
}

/// Repository trait for the append-only event log.
///
/// Every operation takes a cancellation token. A cancelled operation returns
/// `DomainError::Cancelled` and leaves no partial write behind.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by version.
    ///
    /// An unknown aggregate yields an empty stream at version 0.
    async fn load_events(
        &self,
        aggregate_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<EventStream, DomainError>;

    /// Append events to an aggregate stream with optimistic concurrency.
    ///
    /// `expected_version` is the version returned by the load the caller
    /// based its decision on. The events receive versions
    /// `expected_version + 1 ..= expected_version + events.len()` as one
    /// all-or-nothing unit.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
        cancel: &CancellationToken,
    ) -> Result<Committed, DomainError>;

    /// Events of all aggregates with `from <= occurred_at <= to`, ordered by
    /// occurrence time and then by storage sequence.
    async fn list_events_by_time(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// The latest version of every non-empty stream.
    async fn stream_heads(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<StreamHead>, DomainError>;
}

/// Rejects batches that can never be appended: empty batches, negative
/// expected versions and events that belong to another aggregate.
///
/// # Errors
///
/// Returns `DomainError::Validation` describing the first problem found.
pub fn validate_batch(
    aggregate_id: Uuid,
    expected_version: i64,
    events: &[NewEvent],
) -> Result<(), DomainError> {
    if events.is_empty() {
        return Err(DomainError::Validation(format!(
            "append to aggregate {aggregate_id} requires at least one event"
        )));
    }
    if expected_version < 0 {
        return Err(DomainError::Validation(format!(
            "expected version must not be negative, got {expected_version}"
        )));
    }
    if let Some(stray) = events.iter().find(|e| e.aggregate_id != aggregate_id) {
        return Err(DomainError::Validation(format!(
            "event {} belongs to aggregate {}, not {aggregate_id}",
            stray.event_id, stray.aggregate_id
        )));
    }
    Ok(())
}

/// Runs `operation` unless `cancel` fires first.
///
/// If the token is cancelled the future is dropped before completion, which
/// releases (and rolls back) any transaction it holds.
///
/// # Errors
///
/// Returns `DomainError::Cancelled` if the token was cancelled, otherwise
/// the operation's own result.
pub async fn run_cancellable<T, F>(
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    if cancel.is_cancelled() {
        return Err(DomainError::Cancelled);
    }
    cancel
        .run_until_cancelled(operation)
        .await
        .unwrap_or(Err(DomainError::Cancelled))
}
