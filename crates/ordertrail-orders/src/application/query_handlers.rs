//! Query handlers for the order context.
//!
//! These read straight from the event log. The summary read model lives in
//! `ordertrail-read-model`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ordertrail_core::error::DomainError;
use ordertrail_core::event::DomainEvent;
use ordertrail_core::repository::EventRepository;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::events::OrderEvent;

/// Read-only view of an order rebuilt from its stream.
#[derive(Debug, Serialize)]
pub struct OrderView {
    /// The order identifier.
    pub order_id: Uuid,
    /// The customer.
    pub customer: String,
    /// Quantity per item code.
    pub items: BTreeMap<String, i64>,
    /// Whether the order has been checked out.
    pub checked_out: bool,
    /// Current version (event count).
    pub version: i64,
}

/// One event of the log, as exposed to readers.
#[derive(Debug, Serialize)]
pub struct EventView {
    /// Storage-assigned sequence number.
    pub sequence: i64,
    /// Unique event identifier.
    pub event_id: Uuid,
    /// The order the event belongs to.
    pub aggregate_id: Uuid,
    /// Position within the order's stream.
    pub version: i64,
    /// Event type name.
    pub event_type: String,
    /// When the fact occurred, in epoch seconds.
    pub occurred_at: i64,
    /// Event-specific fields.
    pub payload: serde_json::Value,
}

/// Retrieves an order by replaying its stream.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Serialization` if event decoding fails.
pub async fn get_order_by_id(
    order_id: Uuid,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<OrderView, DomainError> {
    let stream = repo.load_events(order_id, cancel).await?;
    if stream.is_empty() {
        return Err(DomainError::AggregateNotFound(order_id));
    }
    let order = command_handlers::reconstitute(order_id, &stream)?;
    Ok(OrderView {
        order_id,
        customer: order.customer().to_owned(),
        items: order.items().clone(),
        checked_out: order.is_checked_out(),
        version: order.version,
    })
}

/// Lists events of every order that occurred within `[from, to]`, oldest
/// first.
///
/// Every event is decoded before it is returned, so a corrupt record fails
/// the whole query rather than being left out.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if any event cannot be decoded, and
/// `DomainError` from the repository otherwise.
pub async fn list_events_by_time(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<Vec<EventView>, DomainError> {
    let stored = repo.list_events_by_time(from, to, cancel).await?;
    stored
        .into_iter()
        .map(|record| {
            let event = OrderEvent::from_stored(&record)?;
            Ok(EventView {
                sequence: record.sequence,
                event_id: record.event_id,
                aggregate_id: record.aggregate_id,
                version: record.version,
                event_type: event.event_type().to_owned(),
                occurred_at: record.occurred_at.timestamp(),
                payload: record.payload,
            })
        })
        .collect()
}
