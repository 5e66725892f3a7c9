//! The order summary record and the changes events make to it.

use ordertrail_orders::domain::events::OrderEventKind;
use serde::Serialize;
use uuid::Uuid;

/// Denormalized per-order totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    /// The order identifier.
    pub order_id: Uuid,
    /// The customer.
    pub customer: String,
    /// Sum of all item quantities, never negative.
    pub total_items: i64,
    /// Whether the order has been checked out.
    pub checked_out: bool,
    /// Stream version of the last event applied to this record.
    pub projected_version: i64,
}

/// The effect of one event on a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryChange {
    /// Insert a new summary with zero totals.
    Open {
        /// The customer.
        customer: String,
    },
    /// Increase the total.
    AddItems(i64),
    /// Decrease the total, stopping at zero.
    RemoveItems(i64),
    /// Set the checked-out flag.
    CheckOut,
}

impl SummaryChange {
    /// Maps an order event to its summary change.
    #[must_use]
    pub fn from_event(kind: &OrderEventKind) -> Self {
        match kind {
            OrderEventKind::OrderCreated(e) => Self::Open {
                customer: e.customer.clone(),
            },
            OrderEventKind::ItemAdded(e) => Self::AddItems(e.quantity),
            OrderEventKind::ItemRemoved(e) => Self::RemoveItems(e.quantity),
            OrderEventKind::OrderCheckedOut(_) => Self::CheckOut,
        }
    }
}

/// What happened when an event was offered to the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The change was applied and the summary advanced one version.
    Applied,
    /// The summary already reflects this version; nothing changed.
    AlreadyApplied,
    /// An earlier version is missing; nothing changed.
    OutOfOrder,
}

impl ProjectionOutcome {
    /// Decides whether an event at `version` may be applied to a summary
    /// whose last projected version is `projected` (`None` if no summary
    /// exists yet).
    #[must_use]
    pub fn classify(projected: Option<i64>, version: i64, change: &SummaryChange) -> Self {
        match (projected, change) {
            (None, SummaryChange::Open { .. }) if version == 1 => Self::Applied,
            (None, _) => Self::OutOfOrder,
            (Some(p), _) if version <= p => Self::AlreadyApplied,
            // Creation only ever inserts.
            (Some(_), SummaryChange::Open { .. }) => Self::AlreadyApplied,
            (Some(p), _) if version == p + 1 => Self::Applied,
            (Some(_), _) => Self::OutOfOrder,
        }
    }

    /// The outcome to report when a guarded write touched nothing, given the
    /// projected version read back afterwards.
    #[must_use]
    pub fn skipped(projected: Option<i64>, version: i64, change: &SummaryChange) -> Self {
        match Self::classify(projected, version, change) {
            Self::Applied => Self::OutOfOrder,
            other => other,
        }
    }
}

impl OrderSummary {
    /// A fresh summary for a just-created order.
    #[must_use]
    pub fn open(order_id: Uuid, customer: String) -> Self {
        Self {
            order_id,
            customer,
            total_items: 0,
            checked_out: false,
            projected_version: 1,
        }
    }

    /// Applies `change` as the event at `version`. The caller is expected to
    /// have classified it as `Applied`.
    pub fn apply(&mut self, change: &SummaryChange, version: i64) {
        match change {
            SummaryChange::Open { .. } => {}
            SummaryChange::AddItems(quantity) => {
                self.total_items = self.total_items.saturating_add(*quantity);
            }
            SummaryChange::RemoveItems(quantity) => {
                self.total_items = self.total_items.saturating_sub(*quantity).max(0);
            }
            SummaryChange::CheckOut => self.checked_out = true,
        }
        self.projected_version = version;
    }
}
