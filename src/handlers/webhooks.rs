//! Inbound webhook receiver.
//!
//! The processor posts every event as a JSON envelope. The receiver stores
//! it, hands it to the registered handler for its kind, and answers 200 once
//! the event is handled, ignored or recognised as a redelivery.

use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::event::{Event, EventEnvelope};
use crate::services::exception_service;
use crate::state::AppState;
use crate::webhooks::ProcessOutcome;

/// Acknowledgement body.
///
/// `status` is one of `processed`, `already_processed`, `invalid`,
/// `ignored` or `duplicate`.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub event_id: String,
    pub status: &'static str,
}

/// One entry of the supported kind listing.
#[derive(Debug, Serialize)]
pub struct WebhookKindResponse {
    pub kind: String,
    pub description: String,
}

impl WebhookAck {
    fn new(event_id: &str, status: &'static str) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                event_id: event_id.to_string(),
                status,
            }),
        )
    }
}

/// List the event kinds with a registered handler.
///
/// # Request
///
/// ```text
/// GET /api/v1/webhooks/kinds
/// ```
pub async fn list_webhook_kinds(State(state): State<AppState>) -> Json<Vec<WebhookKindResponse>> {
    Json(
        state
            .registry
            .descriptions()
            .into_iter()
            .map(|(kind, description)| WebhookKindResponse {
                kind: kind.to_string(),
                description: description.to_string(),
            })
            .collect(),
    )
}

/// Receive a processor event.
///
/// # Flow
///
/// 1. Parse the body as JSON and read the event id (400 if either fails)
/// 2. If an event with that id exists, log "Duplicate event record" against
///    it and answer 200
/// 3. Parse the rest of the envelope (400 without `type` or `livemode`)
/// 4. Store the event; a concurrent insert of the same id takes the
///    duplicate path
/// 5. Kinds without a handler are stored and answered 200 unprocessed
/// 6. Otherwise validate and process; failures are logged against the event
///    and returned as an error response
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "event_id": "evt_XXXXXXXXXXXX",
///   "status": "processed"
/// }
/// ```
pub async fn receive_stripe_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::MalformedPayload(format!("body is not valid JSON: {e}")))?;
    let event_id = EventEnvelope::event_id(&raw)?;
    let raw_text = String::from_utf8_lossy(&body);

    if let Some(existing) = state.store.find_event_by_stripe_id(&event_id).await? {
        return record_duplicate(&state, &existing, &raw_text).await;
    }

    let envelope = EventEnvelope::from_value(raw)?;

    let Some(event) = state.store.insert_event(&envelope).await? else {
        // Another request stored the same id between lookup and insert.
        let existing = state
            .store
            .find_event_by_stripe_id(&event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {event_id}")))?;
        return record_duplicate(&state, &existing, &raw_text).await;
    };

    tracing::info!(
        event_id = %event.stripe_id,
        kind = %event.kind,
        livemode = event.livemode,
        stripe_account = ?event.stripe_account,
        "Webhook event received"
    );

    let kind = event.kind.clone();
    let Some(mut webhook) = state.registry.webhook_for(event)? else {
        tracing::info!(event_id = %event_id, kind = %kind, "No handler registered, event stored");
        return Ok(WebhookAck::new(&event_id, "ignored"));
    };

    let status = match webhook.process(state.webhook_context()).await? {
        ProcessOutcome::Processed => "processed",
        ProcessOutcome::AlreadyProcessed => "already_processed",
        ProcessOutcome::Invalid => "invalid",
    };

    Ok(WebhookAck::new(&event_id, status))
}

async fn record_duplicate(
    state: &AppState,
    existing: &Event,
    raw_text: &str,
) -> AppResult<(StatusCode, Json<WebhookAck>)> {
    exception_service::log_message(
        state.store.as_ref(),
        raw_text,
        "Duplicate event record",
        Some(existing.id),
    )
    .await?;

    Ok(WebhookAck::new(&existing.stripe_id, "duplicate"))
}
