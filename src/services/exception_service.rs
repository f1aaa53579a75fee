//! Append-only log of failures met while receiving or processing events.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::{EventProcessingException, NewEventProcessingException};
use crate::store::BillingStore;

/// Record `error` against an event.
///
/// `data` is stored as given; for processor API errors the response body is
/// used instead when `data` is empty.
pub async fn log_exception(
    store: &dyn BillingStore,
    data: Option<&str>,
    error: &AppError,
    event_id: Option<Uuid>,
) -> AppResult<EventProcessingException> {
    let data = data
        .filter(|d| !d.is_empty())
        .or_else(|| error.processor_body())
        .unwrap_or_default()
        .to_string();

    tracing::error!(
        event_id = ?event_id,
        error = %error,
        "Event processing exception"
    );

    store
        .insert_exception(NewEventProcessingException {
            event_id,
            data,
            message: truncate(&error.to_string(), 500),
            traceback: error.traceback(),
        })
        .await
}

/// Record a plain message, e.g. a duplicate delivery, against an event.
pub async fn log_message(
    store: &dyn BillingStore,
    data: &str,
    message: &str,
    event_id: Option<Uuid>,
) -> AppResult<EventProcessingException> {
    tracing::warn!(event_id = ?event_id, reason = %message, "Event processing exception");

    store
        .insert_exception(NewEventProcessingException {
            event_id,
            data: data.to_string(),
            message: truncate(message, 500),
            traceback: String::new(),
        })
        .await
}

// `message` is VARCHAR(500)
fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::stripe::StripeError;

    #[tokio::test]
    async fn processor_body_becomes_data() {
        let store = MemoryStore::new();
        let error = AppError::Stripe(StripeError::Api {
            status: 500,
            message: "boom".into(),
            body: r#"{"error":{"message":"boom"}}"#.into(),
        });

        let row = log_exception(&store, None, &error, None).await.unwrap();

        assert_eq!(row.data, r#"{"error":{"message":"boom"}}"#);
        assert!(row.message.contains("boom"));
        assert!(!row.traceback.is_empty());
    }

    #[test]
    fn long_messages_are_truncated() {
        assert_eq!(truncate(&"x".repeat(600), 500).len(), 500);
    }
}
