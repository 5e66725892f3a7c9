//! Command handlers for the order context.
//!
//! Each handler follows the same path: load the stream, replay it into an
//! `Order`, let the aggregate validate the command, and append the new
//! events with the loaded version as the expected version. Retrying after a
//! `ConcurrencyConflict` is left to the caller.

use ordertrail_core::aggregate::{AggregateRoot, replay};
use ordertrail_core::clock::Clock;
use ordertrail_core::command::Command;
use ordertrail_core::error::DomainError;
use ordertrail_core::event::DomainEvent;
use ordertrail_core::repository::{EventRepository, EventStream, NewEvent, StoredEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::aggregates::Order;
use crate::domain::commands::{AddItem, CheckOut, CreateOrder, RemoveItem};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct OrderCommandResult {
    /// The aggregate ID affected by the command.
    pub aggregate_id: Uuid,
    /// The stream version after the append.
    pub version: i64,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

/// Reconstitutes an `Order` from its stream.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if a stored event cannot be decoded.
pub(crate) fn reconstitute(order_id: Uuid, stream: &EventStream) -> Result<Order, DomainError> {
    replay(Order::new(order_id), &stream.events)
}

async fn load_existing(
    order_id: Uuid,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<Order, DomainError> {
    let stream = repo.load_events(order_id, cancel).await?;
    if stream.is_empty() {
        return Err(DomainError::AggregateNotFound(order_id));
    }
    reconstitute(order_id, &stream)
}

async fn persist(
    command: &dyn Command,
    order: &mut Order,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<OrderCommandResult, DomainError> {
    let new_events = order
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_new_event)
        .collect::<Result<Vec<NewEvent>, _>>()?;

    let committed = repo
        .append_events(order.id, order.version(), &new_events, cancel)
        .await
        .inspect_err(|err| {
            if let DomainError::ConcurrencyConflict { expected, actual, .. } = err {
                warn!(
                    command_type = command.command_type(),
                    correlation_id = %command.correlation_id(),
                    order_id = %command.aggregate_id(),
                    expected,
                    actual,
                    "stale order version, command rejected"
                );
            }
        })?;
    order.clear_uncommitted_events();

    debug!(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id(),
        order_id = %command.aggregate_id(),
        version = committed.new_version,
        "order events committed"
    );

    Ok(OrderCommandResult {
        aggregate_id: order.id,
        version: committed.new_version,
        stored_events: committed.events,
    })
}

/// Handles the `CreateOrder` command: checks that the stream is empty and
/// appends an `OrderCreated` event at version 1.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the order already exists, and
/// `DomainError` from loading or appending otherwise.
pub async fn handle_create_order(
    command: &CreateOrder,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<OrderCommandResult, DomainError> {
    let stream = repo.load_events(command.order_id, cancel).await?;
    let mut order = reconstitute(command.order_id, &stream)?;

    order.create(&command.customer, command.correlation_id, clock)?;

    persist(command, &mut order, repo, cancel).await
}

/// Handles the `AddItem` command: loads the aggregate, adds the item, and
/// persists the resulting events.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::Validation` if the order is checked out, and `DomainError`
/// from loading or appending otherwise.
pub async fn handle_add_item(
    command: &AddItem,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<OrderCommandResult, DomainError> {
    let mut order = load_existing(command.order_id, repo, cancel).await?;

    order.add_item(
        &command.sku,
        command.quantity,
        command.correlation_id,
        clock,
    )?;

    persist(command, &mut order, repo, cancel).await
}

/// Handles the `RemoveItem` command: loads the aggregate, removes the item,
/// and persists the resulting events.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::Validation` if the order is checked out, and `DomainError`
/// from loading or appending otherwise.
pub async fn handle_remove_item(
    command: &RemoveItem,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<OrderCommandResult, DomainError> {
    let mut order = load_existing(command.order_id, repo, cancel).await?;

    order.remove_item(
        &command.sku,
        command.quantity,
        command.correlation_id,
        clock,
    )?;

    persist(command, &mut order, repo, cancel).await
}

/// Handles the `CheckOut` command: loads the aggregate, checks it out, and
/// persists the resulting events.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::Validation` if the order is already checked out, and
/// `DomainError` from loading or appending otherwise.
pub async fn handle_check_out(
    command: &CheckOut,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    cancel: &CancellationToken,
) -> Result<OrderCommandResult, DomainError> {
    let mut order = load_existing(command.order_id, repo, cancel).await?;

    order.check_out(command.correlation_id, clock)?;

    persist(command, &mut order, repo, cancel).await
}
