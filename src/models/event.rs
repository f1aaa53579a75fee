//! Webhook event log models.
//!
//! This module defines:
//! - `Event`: one inbound processor notification, as stored
//! - `EventEnvelope`: the fields pulled out of a posted body before storing
//! - `EventProcessingException`: one failure recorded while handling an event
//! - Response types for the admin API

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

static NULL: Value = Value::Null;

/// Represents an event record from the database.
///
/// # Database Table
///
/// Maps to the `events` table. Each event:
/// - Is unique by `stripe_id` (the processor's event id)
/// - Keeps the body exactly as posted in `webhook_message`
/// - Gets `validated_message` and `valid` once re-fetched from the processor
/// - Is marked `processed` once its handler ran to completion
///
/// Events are never deleted.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Event {
    pub id: Uuid,

    /// Processor event id (`evt_...`)
    pub stripe_id: String,

    /// Event kind, e.g. `transfer.created`
    pub kind: String,

    pub livemode: bool,

    /// Local customer the event concerns, linked during processing
    pub customer_id: Option<Uuid>,

    /// Connected account the event was sent for
    pub stripe_account: Option<String>,

    /// Body as posted to the webhook endpoint
    pub webhook_message: Value,

    /// Body as returned by the processor API
    pub validated_message: Option<Value>,

    /// `None` until validated
    pub valid: Option<bool>,

    pub processed: bool,

    /// Id of the API request that caused the event, or empty
    pub request: String,

    pub pending_webhooks: i32,

    pub api_version: String,

    pub created_at: DateTime<Utc>,
}

impl Event {
    /// The payload handlers read from: the validated copy once it exists.
    pub fn message(&self) -> &Value {
        self.validated_message
            .as_ref()
            .unwrap_or(&self.webhook_message)
    }

    /// `data.object` of [`Event::message`], or JSON null.
    pub fn data_object(&self) -> &Value {
        self.message().pointer("/data/object").unwrap_or(&NULL)
    }
}

/// Envelope fields extracted from a posted webhook body.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "evt_XXXXXXXXXXXX",
///   "type": "transfer.created",
///   "livemode": true,
///   "api_version": "2017-02-14",
///   "request": {"id": "req_123"},
///   "pending_webhooks": 1,
///   "account": "acct_123",
///   "data": {"object": {"id": "tr_XXXXXXXXXXXX", "object": "transfer"}}
/// }
/// ```
///
/// Older payloads carry the connected account as `user_id` and the request as
/// a bare string; both shapes are accepted.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub stripe_id: String,
    pub kind: String,
    pub livemode: bool,
    pub stripe_account: Option<String>,
    pub api_version: String,
    pub request: String,
    pub pending_webhooks: i32,
    pub raw: Value,
}

impl EventEnvelope {
    /// Extract the event id alone.
    ///
    /// Duplicate detection only needs the id, so this is checked before the
    /// rest of the envelope. Numeric ids are accepted and stringified.
    /// String ids must be ASCII letters, digits and underscores, the only
    /// characters processor ids use.
    pub fn event_id(body: &Value) -> AppResult<String> {
        let id = match body.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(AppError::MalformedPayload(
                    "event id is missing".to_string(),
                ));
            }
        };

        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::MalformedPayload(format!(
                "event id {id:?} is not a processor id"
            )));
        }

        Ok(id)
    }

    /// Parse the full envelope; `type` and `livemode` are required.
    pub fn from_value(raw: Value) -> AppResult<Self> {
        let stripe_id = Self::event_id(&raw)?;

        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::MalformedPayload("event type is missing".to_string()))?
            .to_string();

        let livemode = raw
            .get("livemode")
            .and_then(Value::as_bool)
            .ok_or_else(|| AppError::MalformedPayload("livemode is missing".to_string()))?;

        let stripe_account = ["account", "user_id"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(str::to_string);

        let request = match raw.get("request") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Object(map)) => map
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };

        let api_version = raw
            .get("api_version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let pending_webhooks = raw
            .get("pending_webhooks")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0);

        Ok(Self {
            stripe_id,
            kind,
            livemode,
            stripe_account,
            api_version,
            request,
            pending_webhooks,
            raw,
        })
    }
}

/// Failure recorded while handling an event.
///
/// # Database Table
///
/// Maps to the `event_processing_exceptions` table. Append-only.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct EventProcessingException {
    pub id: Uuid,
    pub event_id: Option<Uuid>,

    /// Raw body or processor error body, when there is one
    pub data: String,

    pub message: String,
    pub traceback: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`EventProcessingException`].
#[derive(Debug, Clone)]
pub struct NewEventProcessingException {
    pub event_id: Option<Uuid>,
    pub data: String,
    pub message: String,
    pub traceback: String,
}

/// Summary returned by `GET /api/v1/events`.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub stripe_id: String,
    pub kind: String,
    pub livemode: bool,
    pub customer_id: Option<Uuid>,
    pub stripe_account: Option<String>,
    pub valid: Option<bool>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Event> for EventResponse {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            stripe_id: event.stripe_id.clone(),
            kind: event.kind.clone(),
            livemode: event.livemode,
            customer_id: event.customer_id,
            stripe_account: event.stripe_account.clone(),
            valid: event.valid,
            processed: event.processed,
            created_at: event.created_at,
        }
    }
}

/// Detail returned by `GET /api/v1/events/{stripe_id}`.
#[derive(Debug, Serialize)]
pub struct EventDetailResponse {
    #[serde(flatten)]
    pub event: EventResponse,
    pub webhook_message: Value,
    pub validated_message: Option<Value>,
    pub exceptions: Vec<EventProcessingException>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_reads_legacy_user_id_and_string_request() {
        let envelope = EventEnvelope::from_value(json!({
            "id": "evt_1",
            "type": "transfer.created",
            "livemode": true,
            "user_id": "acct_123123123",
            "request": "req_9",
            "pending_webhooks": 1,
            "data": {"object": {}}
        }))
        .unwrap();

        assert_eq!(envelope.stripe_account.as_deref(), Some("acct_123123123"));
        assert_eq!(envelope.request, "req_9");
        assert_eq!(envelope.pending_webhooks, 1);
        assert_eq!(envelope.api_version, "");
    }

    #[test]
    fn envelope_prefers_account_over_user_id() {
        let envelope = EventEnvelope::from_value(json!({
            "id": "evt_1",
            "type": "account.updated",
            "livemode": false,
            "account": "acct_new",
            "user_id": "acct_old",
            "request": {"id": "req_1"}
        }))
        .unwrap();

        assert_eq!(envelope.stripe_account.as_deref(), Some("acct_new"));
        assert_eq!(envelope.request, "req_1");
    }

    #[test]
    fn numeric_event_id_is_stringified() {
        assert_eq!(EventEnvelope::event_id(&json!({"id": 123})).unwrap(), "123");
    }

    #[test]
    fn event_ids_outside_processor_charset_are_malformed() {
        for id in ["../customers/cus_1", "evt_1/../x", "evt 1", "evt_1?expand=x", "", "-1"] {
            let err = EventEnvelope::event_id(&json!({"id": id})).unwrap_err();
            assert!(matches!(err, AppError::MalformedPayload(_)), "id {id:?}");
        }
        assert!(EventEnvelope::event_id(&json!({"id": -1})).is_err());
        assert_eq!(
            EventEnvelope::event_id(&json!({"id": "evt_1A2b"})).unwrap(),
            "evt_1A2b"
        );
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = EventEnvelope::from_value(json!({"id": "evt_1", "livemode": true})).unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[test]
    fn data_object_falls_back_to_posted_message() {
        let mut event = crate::test_support::event("transfer.created", json!({
            "id": "evt_1",
            "data": {"object": {"id": "tr_posted"}}
        }));
        assert_eq!(event.data_object()["id"], "tr_posted");

        event.validated_message = Some(json!({"data": {"object": {"id": "tr_validated"}}}));
        assert_eq!(event.data_object()["id"], "tr_validated");
    }
}
