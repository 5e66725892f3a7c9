//! Aggregate roots for the order context.

use std::collections::BTreeMap;

use ordertrail_core::aggregate::AggregateRoot;
use ordertrail_core::clock::Clock;
use ordertrail_core::error::DomainError;
use ordertrail_core::event::EventMetadata;
use uuid::Uuid;

use super::events::{
    ItemAdded, ItemRemoved, OrderCheckedOut, OrderCreated, OrderEvent, OrderEventKind,
};

/// The aggregate root for an order.
///
/// Never persisted directly: it is rebuilt from the order's event stream
/// every time a command is handled.
#[derive(Debug)]
pub struct Order {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    /// The customer, empty until the order is created.
    customer: String,
    /// Quantity per item code. Codes whose quantity drops to zero are pruned.
    items: BTreeMap<String, i64>,
    /// Whether the order has been checked out.
    checked_out: bool,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<OrderEvent>,
}

impl Order {
    /// Creates an empty order at version 0.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            customer: String::new(),
            items: BTreeMap::new(),
            checked_out: false,
            uncommitted_events: Vec::new(),
        }
    }

    /// The customer the order belongs to.
    #[must_use]
    pub fn customer(&self) -> &str {
        &self.customer
    }

    /// Quantity per item code, ordered by code.
    #[must_use]
    pub fn items(&self) -> &BTreeMap<String, i64> {
        &self.items
    }

    /// Whether the order has been checked out.
    #[must_use]
    pub fn is_checked_out(&self) -> bool {
        self.checked_out
    }

    /// Returns the next version for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_version(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn record(&mut self, kind: OrderEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = OrderEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                version: self.next_version(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now_seconds(),
            },
            kind,
        };
        self.uncommitted_events.push(event);
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.checked_out {
            return Err(DomainError::Validation(format!(
                "order {} is already checked out",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_line(sku: &str, quantity: i64) -> Result<(), DomainError> {
        if sku.trim().is_empty() {
            return Err(DomainError::Validation("sku must not be blank".to_owned()));
        }
        if quantity <= 0 {
            return Err(DomainError::Validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        Ok(())
    }

    /// Opens the order, producing an `OrderCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order already has history or
    /// the customer is blank.
    pub fn create(
        &mut self,
        customer: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.version > 0 || !self.uncommitted_events.is_empty() {
            return Err(DomainError::Validation(format!(
                "order {} already exists",
                self.id
            )));
        }
        if customer.trim().is_empty() {
            return Err(DomainError::Validation(
                "customer must not be blank".to_owned(),
            ));
        }
        let kind = OrderEventKind::OrderCreated(OrderCreated {
            order_id: self.id,
            customer: customer.to_owned(),
        });
        self.record(kind, correlation_id, clock);
        Ok(())
    }

    /// Adds units of an item, producing an `ItemAdded` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is checked out, the
    /// sku is blank, the quantity is not positive, or the units held across
    /// all items would exceed `i64::MAX`.
    pub fn add_item(
        &mut self,
        sku: &str,
        quantity: i64,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        Self::ensure_line(sku, quantity)?;
        if self
            .items
            .values()
            .try_fold(quantity, |total, held| total.checked_add(*held))
            .is_none()
        {
            return Err(DomainError::Validation(format!(
                "adding {quantity} units would overflow the order total"
            )));
        }
        let kind = OrderEventKind::ItemAdded(ItemAdded {
            order_id: self.id,
            sku: sku.to_owned(),
            quantity,
        });
        self.record(kind, correlation_id, clock);
        Ok(())
    }

    /// Removes units of an item, producing an `ItemRemoved` event.
    ///
    /// Removing more units than the order holds is accepted; the item code
    /// simply disappears from the order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is checked out, the
    /// sku is blank or the quantity is not positive.
    pub fn remove_item(
        &mut self,
        sku: &str,
        quantity: i64,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        Self::ensure_line(sku, quantity)?;
        let kind = OrderEventKind::ItemRemoved(ItemRemoved {
            order_id: self.id,
            sku: sku.to_owned(),
            quantity,
        });
        self.record(kind, correlation_id, clock);
        Ok(())
    }

    /// Checks the order out, producing an `OrderCheckedOut` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is already checked out.
    pub fn check_out(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        let kind = OrderEventKind::OrderCheckedOut(OrderCheckedOut { order_id: self.id });
        self.record(kind, correlation_id, clock);
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Event = OrderEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            OrderEventKind::OrderCreated(payload) => {
                self.id = payload.order_id;
                self.customer.clone_from(&payload.customer);
            }
            OrderEventKind::ItemAdded(payload) => {
                adjust(&mut self.items, &payload.sku, payload.quantity);
            }
            OrderEventKind::ItemRemoved(payload) => {
                adjust(&mut self.items, &payload.sku, -payload.quantity);
            }
            OrderEventKind::OrderCheckedOut(_) => {
                self.checked_out = true;
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

fn adjust(items: &mut BTreeMap<String, i64>, sku: &str, delta: i64) {
    let quantity = items.get(sku).copied().unwrap_or(0).saturating_add(delta);
    if quantity <= 0 {
        items.remove(sku);
    } else {
        items.insert(sku.to_owned(), quantity);
    }
}
