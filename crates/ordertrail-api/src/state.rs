//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use ordertrail_core::clock::Clock;
use ordertrail_core::repository::EventRepository;
use ordertrail_read_model::SummaryProjector;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock used to stamp new events.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// The order event log.
    pub event_repository: Arc<dyn EventRepository>,
    /// Summary projection, fed after every successful append.
    pub projector: SummaryProjector,
    /// Deadline for the storage work of one request.
    pub request_timeout: Duration,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock + Send + Sync>,
        event_repository: Arc<dyn EventRepository>,
        projector: SummaryProjector,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            clock,
            event_repository,
            projector,
            request_timeout,
            shutdown,
        }
    }

    /// Starts the deadline for one request.
    ///
    /// The returned token is cancelled once `request_timeout` elapses, when
    /// the server shuts down, or when the `Deadline` is dropped.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        let token = self.shutdown.child_token();
        let timer = token.clone();
        let timeout = self.request_timeout;
        tokio::spawn(async move {
            if timer.run_until_cancelled(tokio::time::sleep(timeout)).await.is_some() {
                timer.cancel();
            }
        });
        Deadline {
            _cancel_on_drop: token.clone().drop_guard(),
            token,
        }
    }
}

/// Cancellation scope of one request.
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl Deadline {
    /// The token to hand to storage operations.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
