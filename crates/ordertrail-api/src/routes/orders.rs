//! Routes for the order context.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ordertrail_core::error::DomainError;
use ordertrail_core::repository::StoredEvent;
use ordertrail_orders::application::command_handlers::{self, OrderCommandResult};
use ordertrail_orders::application::query_handlers::{self, OrderView};
use ordertrail_orders::domain::commands;
use ordertrail_read_model::OrderSummary;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /create.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Identifier for the new order, chosen by the caller.
    pub order_id: Uuid,
    /// The customer the order belongs to.
    pub customer: String,
}

/// Request body for POST /add-item and POST /remove-item.
#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    /// The order to change.
    pub order_id: Uuid,
    /// The item code.
    pub sku: String,
    /// How many units.
    pub quantity: i64,
}

/// Request body for POST /check-out.
#[derive(Debug, Deserialize)]
pub struct CheckOutRequest {
    /// The order to check out.
    pub order_id: Uuid,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The order the command applied to.
    pub aggregate_id: Uuid,
    /// Stream version after the append.
    pub version: i64,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Feeds committed events to the summary projection and builds the response.
///
/// The events are already in the log, so a projection failure is logged and
/// left for the background catch-up instead of failing the request.
async fn respond(
    state: &AppState,
    result: OrderCommandResult,
    cancel: &CancellationToken,
) -> Json<CommandResponse> {
    project_committed(state, &result.stored_events, cancel).await;
    Json(CommandResponse {
        aggregate_id: result.aggregate_id,
        version: result.version,
        event_ids: result.stored_events.iter().map(|e| e.event_id).collect(),
    })
}

async fn project_committed(
    state: &AppState,
    events: &[StoredEvent],
    cancel: &CancellationToken,
) {
    if let Err(e) = state.projector.project(events, cancel).await {
        error!(
            aggregate_id = ?events.first().map(|e| e.aggregate_id),
            error = %e,
            "summary projection failed after commit"
        );
    }
}

/// POST /create
#[instrument(skip(state, request), fields(order_id = %request.order_id))]
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CreateOrder {
        correlation_id: Uuid::new_v4(),
        order_id: request.order_id,
        customer: request.customer,
    };

    info!(correlation_id = %command.correlation_id, "handling create_order command");

    let deadline = state.deadline();
    let result = command_handlers::handle_create_order(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        deadline.token(),
    )
    .await?;

    Ok(respond(&state, result, deadline.token()).await)
}

/// POST /add-item
#[instrument(skip(state, request), fields(order_id = %request.order_id))]
async fn add_item(
    State(state): State<AppState>,
    Json(request): Json<ItemRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::AddItem {
        correlation_id: Uuid::new_v4(),
        order_id: request.order_id,
        sku: request.sku,
        quantity: request.quantity,
    };

    info!(correlation_id = %command.correlation_id, "handling add_item command");

    let deadline = state.deadline();
    let result = command_handlers::handle_add_item(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        deadline.token(),
    )
    .await?;

    Ok(respond(&state, result, deadline.token()).await)
}

/// POST /remove-item
#[instrument(skip(state, request), fields(order_id = %request.order_id))]
async fn remove_item(
    State(state): State<AppState>,
    Json(request): Json<ItemRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::RemoveItem {
        correlation_id: Uuid::new_v4(),
        order_id: request.order_id,
        sku: request.sku,
        quantity: request.quantity,
    };

    info!(correlation_id = %command.correlation_id, "handling remove_item command");

    let deadline = state.deadline();
    let result = command_handlers::handle_remove_item(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        deadline.token(),
    )
    .await?;

    Ok(respond(&state, result, deadline.token()).await)
}

/// POST /check-out
#[instrument(skip(state, request), fields(order_id = %request.order_id))]
async fn check_out(
    State(state): State<AppState>,
    Json(request): Json<CheckOutRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CheckOut {
        correlation_id: Uuid::new_v4(),
        order_id: request.order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling check_out command");

    let deadline = state.deadline();
    let result = command_handlers::handle_check_out(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        deadline.token(),
    )
    .await?;

    Ok(respond(&state, result, deadline.token()).await)
}

/// GET /{order_id}
#[instrument(skip(state))]
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let deadline = state.deadline();
    let view =
        query_handlers::get_order_by_id(order_id, &*state.event_repository, deadline.token())
            .await?;
    Ok(Json(view))
}

/// GET /{order_id}/summary
#[instrument(skip(state))]
async fn get_summary(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderSummary>, ApiError> {
    let deadline = state.deadline();
    let summary = state
        .projector
        .summary(order_id, deadline.token())
        .await?
        .ok_or(DomainError::AggregateNotFound(order_id))?;
    Ok(Json(summary))
}

/// Returns the router for the order context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_order))
        .route("/add-item", post(add_item))
        .route("/remove-item", post(remove_item))
        .route("/check-out", post(check_out))
        .route("/{order_id}", get(get_order))
        .route("/{order_id}/summary", get(get_summary))
}
