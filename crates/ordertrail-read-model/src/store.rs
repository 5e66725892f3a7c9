//! Storage abstraction for order summaries.

use std::collections::HashMap;

use async_trait::async_trait;
use ordertrail_core::error::DomainError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::summary::{OrderSummary, ProjectionOutcome, SummaryChange};

/// Durable home of the order summaries.
///
/// `apply` must check the version guard and write in one atomic step, so
/// that two projectors racing on the same order never apply an event twice.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Applies `change` as the event at `version` of `order_id`'s stream if
    /// it is the next one the summary is waiting for.
    async fn apply(
        &self,
        order_id: Uuid,
        version: i64,
        change: &SummaryChange,
        cancel: &CancellationToken,
    ) -> Result<ProjectionOutcome, DomainError>;

    /// The summary of one order, if any event of it has been projected.
    async fn get(
        &self,
        order_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<OrderSummary>, DomainError>;

    /// The projected version of every stored summary.
    async fn projected_versions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<Uuid, i64>, DomainError>;
}
