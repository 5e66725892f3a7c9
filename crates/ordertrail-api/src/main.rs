//! Ordertrail API server entry point.

use std::sync::Arc;

use ordertrail_api::catch_up::run_catch_up;
use ordertrail_api::config::AppConfig;
use ordertrail_api::error::AppError;
use ordertrail_api::state::AppState;
use ordertrail_core::clock::SystemClock;
use ordertrail_core::repository::EventRepository;
use ordertrail_event_store::PgEventRepository;
use ordertrail_read_model::{PgSummaryStore, SummaryProjector};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Ordertrail API server");

    let config = AppConfig::from_env()?;
    let addr = config.bind_addr()?;

    // One pool for the log and the read model, closed on the way out.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let shutdown = CancellationToken::new();
    let event_repository: Arc<dyn EventRepository> =
        Arc::new(PgEventRepository::new(pool.clone()));
    let projector = SummaryProjector::new(Arc::new(PgSummaryStore::new(pool.clone())));

    let catch_up = tokio::spawn(run_catch_up(
        projector.clone(),
        Arc::clone(&event_repository),
        config.catch_up_interval,
        shutdown.clone(),
    ));

    let app_state = AppState::new(
        Arc::new(SystemClock),
        event_repository,
        projector,
        config.request_timeout,
        shutdown.clone(),
    );
    let app = ordertrail_api::build_router(app_state).layer(CorsLayer::permissive());

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Err(e) = catch_up.await {
        tracing::error!(error = %e, "projection catch-up task panicked");
    }
    pool.close().await;
    tracing::info!("Ordertrail API server stopped");

    served.map_err(AppError::from)
}

/// Resolves on Ctrl-C, SIGTERM, or when `shutdown` is cancelled elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
        () = shutdown.cancelled() => {}
    }
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
