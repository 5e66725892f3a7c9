//! Aggregate root abstraction and replay.

use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::repository::StoredEvent;

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Apply an event to mutate internal state (used during reconstitution).
    ///
    /// Must be a pure state transition: no I/O, no clock, no randomness.
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);
}

/// Folds a stored stream into `aggregate`, oldest event first.
///
/// Each stored event is decoded before it is applied, so an undecodable
/// record aborts the replay instead of being skipped.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if an event cannot be decoded and
/// `DomainError::Infrastructure` if the stream belongs to another aggregate
/// or its versions are not contiguous.
pub fn replay<A>(mut aggregate: A, stored: &[StoredEvent]) -> Result<A, DomainError>
where
    A: AggregateRoot,
{
    for record in stored {
        if record.aggregate_id != aggregate.aggregate_id() {
            return Err(DomainError::Infrastructure(format!(
                "event {} belongs to aggregate {}, not {}",
                record.event_id,
                record.aggregate_id,
                aggregate.aggregate_id()
            )));
        }
        if record.version != aggregate.version() + 1 {
            return Err(DomainError::Infrastructure(format!(
                "stream {} expected version {} but found {}",
                record.aggregate_id,
                aggregate.version() + 1,
                record.version
            )));
        }
        let event = A::Event::from_stored(record)?;
        aggregate.apply(&event);
    }
    Ok(aggregate)
}
