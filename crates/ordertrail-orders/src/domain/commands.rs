//! Commands for the order context.

use ordertrail_core::command::Command;
use uuid::Uuid;

/// Command to open a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier, supplied by the caller.
    pub order_id: Uuid,
    /// The customer placing the order.
    pub customer: String,
}

impl Command for CreateOrder {
    fn command_type(&self) -> &'static str {
        "orders.create_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }
}

/// Command to add units of an item to an order.
#[derive(Debug, Clone)]
pub struct AddItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
    /// The item code.
    pub sku: String,
    /// Units to add; must be positive.
    pub quantity: i64,
}

impl Command for AddItem {
    fn command_type(&self) -> &'static str {
        "orders.add_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }
}

/// Command to remove units of an item from an order.
#[derive(Debug, Clone)]
pub struct RemoveItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
    /// The item code.
    pub sku: String,
    /// Units to remove; must be positive.
    pub quantity: i64,
}

impl Command for RemoveItem {
    fn command_type(&self) -> &'static str {
        "orders.remove_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }
}

/// Command to check an order out.
#[derive(Debug, Clone)]
pub struct CheckOut {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
}

impl Command for CheckOut {
    fn command_type(&self) -> &'static str {
        "orders.check_out"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }
}
