//! Admin endpoints for the webhook event log.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::event::{EventDetailResponse, EventResponse};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub limit: Option<i64>,
}

/// List recent events, newest first.
///
/// `limit` defaults to 50 and is clamped to 1..=500.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let events = state.store.list_events(limit).await?;

    Ok(Json(events.iter().map(EventResponse::from).collect()))
}

/// Fetch one event by processor id, including both payloads and every
/// exception recorded against it.
///
/// # Errors
///
/// - `NotFound`: no event with this id
pub async fn get_event(
    State(state): State<AppState>,
    Path(stripe_id): Path<String>,
) -> Result<Json<EventDetailResponse>, AppError> {
    let event = state
        .store
        .find_event_by_stripe_id(&stripe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {stripe_id}")))?;

    let exceptions = state.store.exceptions_for_event(event.id).await?;

    Ok(Json(EventDetailResponse {
        event: EventResponse::from(&event),
        webhook_message: event.webhook_message,
        validated_message: event.validated_message,
        exceptions,
    }))
}
