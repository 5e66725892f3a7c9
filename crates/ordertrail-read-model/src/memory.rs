//! In-memory summary store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ordertrail_core::error::DomainError;
use ordertrail_core::repository::run_cancellable;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::store::SummaryStore;
use crate::summary::{OrderSummary, ProjectionOutcome, SummaryChange};

/// A thread-safe summary store backed by a `HashMap`. Guard check and
/// write happen under one lock.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    summaries: Mutex<HashMap<Uuid, OrderSummary>>,
}

impl InMemorySummaryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, OrderSummary>>, DomainError> {
        self.summaries
            .lock()
            .map_err(|_| DomainError::Infrastructure("in-memory summary store poisoned".into()))
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn apply(
        &self,
        order_id: Uuid,
        version: i64,
        change: &SummaryChange,
        cancel: &CancellationToken,
    ) -> Result<ProjectionOutcome, DomainError> {
        run_cancellable(cancel, async {
            let mut summaries = self.lock()?;
            let current = summaries.get(&order_id).map(|s| s.projected_version);
            let outcome = ProjectionOutcome::classify(current, version, change);
            if outcome != ProjectionOutcome::Applied {
                return Ok(outcome);
            }
            if let Some(summary) = summaries.get_mut(&order_id) {
                summary.apply(change, version);
            } else if let SummaryChange::Open { customer } = change {
                summaries.insert(order_id, OrderSummary::open(order_id, customer.clone()));
            }
            Ok(outcome)
        })
        .await
    }

    async fn get(
        &self,
        order_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<OrderSummary>, DomainError> {
        run_cancellable(cancel, async { Ok(self.lock()?.get(&order_id).cloned()) }).await
    }

    async fn projected_versions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<Uuid, i64>, DomainError> {
        run_cancellable(cancel, async {
            Ok(self
                .lock()?
                .iter()
                .map(|(id, summary)| (*id, summary.projected_version))
                .collect())
        })
        .await
    }
}
