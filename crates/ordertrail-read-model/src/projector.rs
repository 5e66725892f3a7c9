//! Applies committed order events to the summary store and repairs
//! summaries that fell behind the log.

use std::sync::Arc;

use ordertrail_core::error::DomainError;
use ordertrail_core::event::DomainEvent;
use ordertrail_core::repository::{EventRepository, StoredEvent};
use ordertrail_orders::domain::events::OrderEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::store::SummaryStore;
use crate::summary::{OrderSummary, ProjectionOutcome, SummaryChange};

/// A stream whose summary is behind the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaggingStream {
    /// The order.
    pub aggregate_id: Uuid,
    /// Version the summary reflects, 0 if it has no summary yet.
    pub projected_version: i64,
    /// Latest version in the log.
    pub head_version: i64,
}

/// Result of one catch-up pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    /// Lagging streams found.
    pub streams: usize,
    /// Events applied across all of them.
    pub applied: usize,
    /// Streams that could not be repaired in this pass.
    pub failed: usize,
}

/// Keeps order summaries in step with the event log.
#[derive(Clone)]
pub struct SummaryProjector {
    store: Arc<dyn SummaryStore>,
}

impl std::fmt::Debug for SummaryProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryProjector").finish_non_exhaustive()
    }
}

impl SummaryProjector {
    /// Creates a projector writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SummaryStore>) -> Self {
        Self { store }
    }

    /// Applies freshly committed events, in the order given.
    ///
    /// An event that arrives after a gap is reported as `OutOfOrder` and left
    /// for `catch_up`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if an event cannot be decoded,
    /// and store errors otherwise. Events before the failing one stay
    /// applied.
    #[instrument(skip(self, events, cancel), fields(event_count = events.len()))]
    pub async fn project(
        &self,
        events: &[StoredEvent],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectionOutcome>, DomainError> {
        let mut outcomes = Vec::with_capacity(events.len());
        for stored in events {
            let event = OrderEvent::from_stored(stored)?;
            let change = SummaryChange::from_event(&event.kind);
            let outcome = self
                .store
                .apply(stored.aggregate_id, stored.version, &change, cancel)
                .await?;
            match outcome {
                ProjectionOutcome::Applied => {}
                ProjectionOutcome::AlreadyApplied => debug!(
                    aggregate_id = %stored.aggregate_id,
                    version = stored.version,
                    "event already projected"
                ),
                ProjectionOutcome::OutOfOrder => warn!(
                    aggregate_id = %stored.aggregate_id,
                    version = stored.version,
                    event_type = event.event_type(),
                    "event arrived ahead of summary, leaving it for catch-up"
                ),
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Every stream whose summary is behind the log, ordered by aggregate id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if either the log or the store cannot be read.
    pub async fn lagging(
        &self,
        log: &dyn EventRepository,
        cancel: &CancellationToken,
    ) -> Result<Vec<LaggingStream>, DomainError> {
        let heads = log.stream_heads(cancel).await?;
        let projected = self.store.projected_versions(cancel).await?;
        Ok(heads
            .into_iter()
            .filter_map(|head| {
                let projected_version = projected.get(&head.aggregate_id).copied().unwrap_or(0);
                (head.version > projected_version).then_some(LaggingStream {
                    aggregate_id: head.aggregate_id,
                    projected_version,
                    head_version: head.version,
                })
            })
            .collect())
    }

    /// Re-drives the events each lagging summary is missing.
    ///
    /// A stream that fails (for instance on an undecodable event) is logged
    /// and counted in `failed`; the pass carries on with the others.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the lagging streams cannot be determined or
    /// the pass is cancelled.
    #[instrument(skip(self, log, cancel))]
    pub async fn catch_up(
        &self,
        log: &dyn EventRepository,
        cancel: &CancellationToken,
    ) -> Result<CatchUpReport, DomainError> {
        let lagging = self.lagging(log, cancel).await?;
        let mut report = CatchUpReport {
            streams: lagging.len(),
            ..CatchUpReport::default()
        };
        for stream in lagging {
            match self.repair(log, stream, cancel).await {
                Ok(applied) => report.applied += applied,
                Err(DomainError::Cancelled) => return Err(DomainError::Cancelled),
                Err(e) => {
                    error!(
                        aggregate_id = %stream.aggregate_id,
                        projected_version = stream.projected_version,
                        error = %e,
                        "summary catch-up failed"
                    );
                    report.failed += 1;
                }
            }
        }
        if report.streams > 0 {
            info!(
                streams = report.streams,
                applied = report.applied,
                failed = report.failed,
                "summary catch-up finished"
            );
        }
        Ok(report)
    }

    /// The summary of one order, if it has been projected.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the store cannot be read.
    pub async fn summary(
        &self,
        order_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<OrderSummary>, DomainError> {
        self.store.get(order_id, cancel).await
    }

    async fn repair(
        &self,
        log: &dyn EventRepository,
        stream: LaggingStream,
        cancel: &CancellationToken,
    ) -> Result<usize, DomainError> {
        let loaded = log.load_events(stream.aggregate_id, cancel).await?;
        let missing: Vec<StoredEvent> = loaded
            .events
            .into_iter()
            .filter(|e| e.version > stream.projected_version)
            .collect();
        let outcomes = self.project(&missing, cancel).await?;
        Ok(outcomes
            .iter()
            .filter(|o| **o == ProjectionOutcome::Applied)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ordertrail_core::repository::NewEvent;
    use ordertrail_orders::application::command_handlers::{
        handle_add_item, handle_check_out, handle_create_order, handle_remove_item,
    };
    use ordertrail_orders::domain::commands::{AddItem, CheckOut, CreateOrder, RemoveItem};
    use ordertrail_test_support::{FixedClock, InMemoryEventRepository};

    use super::*;
    use crate::memory::InMemorySummaryStore;

    struct Fixture {
        log: InMemoryEventRepository,
        projector: SummaryProjector,
        clock: FixedClock,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                log: InMemoryEventRepository::new(),
                projector: SummaryProjector::new(Arc::new(InMemorySummaryStore::new())),
                clock: FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()),
                cancel: CancellationToken::new(),
            }
        }

        /// Runs the lifecycle Created, ItemAdded(4), ItemRemoved(1), CheckedOut
        /// and returns the committed events of every command.
        async fn run_lifecycle(&self, order_id: Uuid) -> Vec<StoredEvent> {
            let mut committed = Vec::new();
            let create = CreateOrder {
                correlation_id: Uuid::new_v4(),
                order_id,
                customer: "C".to_owned(),
            };
            let result = handle_create_order(&create, &self.clock, &self.log, &self.cancel)
                .await
                .unwrap();
            committed.extend(result.stored_events);
            let add = AddItem {
                correlation_id: Uuid::new_v4(),
                order_id,
                sku: "A".to_owned(),
                quantity: 4,
            };
            let result = handle_add_item(&add, &self.clock, &self.log, &self.cancel)
                .await
                .unwrap();
            committed.extend(result.stored_events);
            let remove = RemoveItem {
                correlation_id: Uuid::new_v4(),
                order_id,
                sku: "A".to_owned(),
                quantity: 1,
            };
            let result = handle_remove_item(&remove, &self.clock, &self.log, &self.cancel)
                .await
                .unwrap();
            committed.extend(result.stored_events);
            let check_out = CheckOut {
                correlation_id: Uuid::new_v4(),
                order_id,
            };
            let result = handle_check_out(&check_out, &self.clock, &self.log, &self.cancel)
                .await
                .unwrap();
            committed.extend(result.stored_events);
            committed
        }
    }

    #[tokio::test]
    async fn test_project_lifecycle_builds_expected_summary() {
        // Arrange
        let fx = Fixture::new();
        let order_id = Uuid::new_v4();
        let committed = fx.run_lifecycle(order_id).await;

        // Act
        let outcomes = fx.projector.project(&committed, &fx.cancel).await.unwrap();

        // Assert
        assert!(outcomes.iter().all(|o| *o == ProjectionOutcome::Applied));
        let summary = fx
            .projector
            .summary(order_id, &fx.cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.customer, "C");
        assert_eq!(summary.total_items, 3);
        assert!(summary.checked_out);
        assert_eq!(summary.projected_version, 4);
    }

    #[tokio::test]
    async fn test_reprojecting_same_events_changes_nothing() {
        // Arrange
        let fx = Fixture::new();
        let order_id = Uuid::new_v4();
        let committed = fx.run_lifecycle(order_id).await;
        fx.projector.project(&committed, &fx.cancel).await.unwrap();
        let before = fx.projector.summary(order_id, &fx.cancel).await.unwrap();

        // Act
        let outcomes = fx.projector.project(&committed, &fx.cancel).await.unwrap();

        // Assert
        assert!(
            outcomes
                .iter()
                .all(|o| *o == ProjectionOutcome::AlreadyApplied)
        );
        assert_eq!(
            fx.projector.summary(order_id, &fx.cancel).await.unwrap(),
            before
        );
    }

    #[tokio::test]
    async fn test_crash_before_projection_is_detected_and_repaired() {
        // Arrange: the appends commit but the projection step never runs for
        // the last three events.
        let fx = Fixture::new();
        let order_id = Uuid::new_v4();
        let committed = fx.run_lifecycle(order_id).await;
        fx.projector
            .project(&committed[..1], &fx.cancel)
            .await
            .unwrap();

        // Act
        let lagging = fx.projector.lagging(&fx.log, &fx.cancel).await.unwrap();
        let report = fx.projector.catch_up(&fx.log, &fx.cancel).await.unwrap();

        // Assert
        assert_eq!(
            lagging,
            vec![LaggingStream {
                aggregate_id: order_id,
                projected_version: 1,
                head_version: 4,
            }]
        );
        assert_eq!(
            report,
            CatchUpReport {
                streams: 1,
                applied: 3,
                failed: 0
            }
        );
        let summary = fx
            .projector
            .summary(order_id, &fx.cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.total_items, 3);
        assert!(summary.checked_out);
        assert!(
            fx.projector
                .lagging(&fx.log, &fx.cancel)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_second_catch_up_applies_nothing() {
        let fx = Fixture::new();
        fx.run_lifecycle(Uuid::new_v4()).await;
        fx.run_lifecycle(Uuid::new_v4()).await;
        let first = fx.projector.catch_up(&fx.log, &fx.cancel).await.unwrap();

        let second = fx.projector.catch_up(&fx.log, &fx.cancel).await.unwrap();

        assert_eq!(first.streams, 2);
        assert_eq!(first.applied, 8);
        assert_eq!(second, CatchUpReport::default());
    }

    #[tokio::test]
    async fn test_event_after_gap_is_left_for_catch_up() {
        let fx = Fixture::new();
        let order_id = Uuid::new_v4();
        let committed = fx.run_lifecycle(order_id).await;
        fx.projector
            .project(&committed[..1], &fx.cancel)
            .await
            .unwrap();

        let outcomes = fx
            .projector
            .project(&committed[3..], &fx.cancel)
            .await
            .unwrap();

        assert_eq!(outcomes, vec![ProjectionOutcome::OutOfOrder]);
        let summary = fx
            .projector
            .summary(order_id, &fx.cancel)
            .await
            .unwrap()
            .unwrap();
        assert!(!summary.checked_out);
    }

    #[tokio::test]
    async fn test_catch_up_counts_undecodable_stream_as_failed() {
        // Arrange
        let fx = Fixture::new();
        let healthy = Uuid::new_v4();
        fx.run_lifecycle(healthy).await;
        let corrupt = Uuid::new_v4();
        let bad = NewEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: corrupt,
            event_type: "order.renamed".to_owned(),
            payload: serde_json::json!({ "order_id": corrupt }),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        };
        fx.log
            .append_events(corrupt, 0, &[bad], &fx.cancel)
            .await
            .unwrap();

        // Act
        let report = fx.projector.catch_up(&fx.log, &fx.cancel).await.unwrap();

        // Assert
        assert_eq!(report.streams, 2);
        assert_eq!(report.applied, 4);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_catch_up_returns_cancelled() {
        let fx = Fixture::new();
        fx.run_lifecycle(Uuid::new_v4()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fx.projector.catch_up(&fx.log, &cancel).await;

        assert!(matches!(result, Err(DomainError::Cancelled)));
    }
}
