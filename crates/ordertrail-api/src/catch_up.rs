//! Background projection catch-up.

use std::sync::Arc;
use std::time::Duration;

use ordertrail_core::error::DomainError;
use ordertrail_core::repository::EventRepository;
use ordertrail_read_model::SummaryProjector;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs a catch-up pass immediately and then every `interval` until
/// `shutdown` is cancelled.
///
/// Failed passes are logged and retried on the next tick.
pub async fn run_catch_up(
    projector: SummaryProjector,
    log: Arc<dyn EventRepository>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while shutdown.run_until_cancelled(ticker.tick()).await.is_some() {
        match projector.catch_up(&*log, &shutdown).await {
            Ok(_) | Err(DomainError::Cancelled) => {}
            Err(e) => error!(error = %e, "projection catch-up pass failed"),
        }
    }
    info!("projection catch-up stopped");
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ordertrail_orders::application::command_handlers::handle_create_order;
    use ordertrail_orders::domain::commands::CreateOrder;
    use ordertrail_read_model::InMemorySummaryStore;
    use ordertrail_test_support::{FixedClock, InMemoryEventRepository};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_startup_pass_projects_existing_orders_and_stops_on_shutdown() {
        // Arrange
        let log = Arc::new(InMemoryEventRepository::new());
        let order_id = Uuid::new_v4();
        let command = CreateOrder {
            correlation_id: Uuid::new_v4(),
            order_id,
            customer: "C".to_owned(),
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        handle_create_order(&command, &clock, &*log, &CancellationToken::new())
            .await
            .unwrap();
        let projector = SummaryProjector::new(Arc::new(InMemorySummaryStore::new()));
        let shutdown = CancellationToken::new();

        // Act
        let worker = tokio::spawn(run_catch_up(
            projector.clone(),
            log,
            Duration::from_secs(3600),
            shutdown.clone(),
        ));
        let mut summary = None;
        for _ in 0..100 {
            summary = projector
                .summary(order_id, &CancellationToken::new())
                .await
                .unwrap();
            if summary.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();

        // Assert
        assert_eq!(summary.unwrap().customer, "C");
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
