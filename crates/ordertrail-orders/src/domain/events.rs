//! Domain events for the order context.

use ordertrail_core::error::DomainError;
use ordertrail_core::event::{DomainEvent, EventMetadata};
use ordertrail_core::repository::StoredEvent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type name for `OrderCreated`.
pub const ORDER_CREATED_EVENT_TYPE: &str = "order.created";
/// Event type name for `ItemAdded`.
pub const ITEM_ADDED_EVENT_TYPE: &str = "order.item_added";
/// Event type name for `ItemRemoved`.
pub const ITEM_REMOVED_EVENT_TYPE: &str = "order.item_removed";
/// Event type name for `OrderCheckedOut`.
pub const ORDER_CHECKED_OUT_EVENT_TYPE: &str = "order.checked_out";

/// Emitted when an order is opened for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// The order identifier.
    pub order_id: Uuid,
    /// The customer the order belongs to.
    pub customer: String,
}

/// Emitted when a quantity of an item is added to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    /// The order identifier.
    pub order_id: Uuid,
    /// The item code.
    pub sku: String,
    /// How many units were added.
    pub quantity: i64,
}

/// Emitted when a quantity of an item is taken out of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    /// The order identifier.
    pub order_id: Uuid,
    /// The item code.
    pub sku: String,
    /// How many units were removed.
    pub quantity: i64,
}

/// Emitted when an order is checked out. No further changes are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCheckedOut {
    /// The order identifier.
    pub order_id: Uuid,
}

/// Event payload variants for the order context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEventKind {
    /// An order has been created.
    OrderCreated(OrderCreated),
    /// Items have been added.
    ItemAdded(ItemAdded),
    /// Items have been removed.
    ItemRemoved(ItemRemoved),
    /// The order has been checked out.
    OrderCheckedOut(OrderCheckedOut),
}

impl OrderEventKind {
    /// Returns the persisted event type name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => ORDER_CREATED_EVENT_TYPE,
            Self::ItemAdded(_) => ITEM_ADDED_EVENT_TYPE,
            Self::ItemRemoved(_) => ITEM_REMOVED_EVENT_TYPE,
            Self::OrderCheckedOut(_) => ORDER_CHECKED_OUT_EVENT_TYPE,
        }
    }

    /// Returns the order the payload refers to.
    #[must_use]
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::OrderCreated(e) => e.order_id,
            Self::ItemAdded(e) => e.order_id,
            Self::ItemRemoved(e) => e.order_id,
            Self::OrderCheckedOut(e) => e.order_id,
        }
    }

    /// Encodes the variant's fields as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if encoding fails.
    pub fn encode(&self) -> Result<serde_json::Value, DomainError> {
        let encoded = match self {
            Self::OrderCreated(e) => serde_json::to_value(e),
            Self::ItemAdded(e) => serde_json::to_value(e),
            Self::ItemRemoved(e) => serde_json::to_value(e),
            Self::OrderCheckedOut(e) => serde_json::to_value(e),
        };
        encoded.map_err(|e| {
            DomainError::Serialization(format!("failed to encode {}: {e}", self.event_type()))
        })
    }

    /// Decodes a payload according to its persisted event type name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if `event_type` is unknown or
    /// the payload does not have the fields of that type.
    pub fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            ORDER_CREATED_EVENT_TYPE => decode_fields(event_type, payload).map(Self::OrderCreated),
            ITEM_ADDED_EVENT_TYPE => decode_fields(event_type, payload).map(Self::ItemAdded),
            ITEM_REMOVED_EVENT_TYPE => decode_fields(event_type, payload).map(Self::ItemRemoved),
            ORDER_CHECKED_OUT_EVENT_TYPE => {
                decode_fields(event_type, payload).map(Self::OrderCheckedOut)
            }
            unknown => Err(DomainError::Serialization(format!(
                "unknown event type: {unknown}"
            ))),
        }
    }
}

fn decode_fields<T: DeserializeOwned>(
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<T, DomainError> {
    T::deserialize(payload).map_err(|e| {
        DomainError::Serialization(format!("payload does not match {event_type}: {e}"))
    })
}

/// Domain event envelope for the order context.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: OrderEventKind,
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        self.kind.encode()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let kind = OrderEventKind::decode(&stored.event_type, &stored.payload)?;
        if kind.order_id() != stored.aggregate_id {
            return Err(DomainError::Serialization(format!(
                "event {} payload names order {} but is stored under {}",
                stored.event_id,
                kind.order_id(),
                stored.aggregate_id
            )));
        }
        Ok(Self {
            metadata: EventMetadata::from_stored(stored),
            kind,
        })
    }
}
