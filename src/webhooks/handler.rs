//! Webhook handler trait and the per-event processing lifecycle.
//!
//! An event moves through these states:
//!
//! ```text
//! received ──validate──▶ validated ──process──▶ processed
//!                            │
//!                            ├──(payload differs)──▶ invalid, left unprocessed
//!                            └──(error)───────────▶ exception logged, left unprocessed
//! ```
//!
//! [`WebhookHandler`] is the per-kind hook; [`Webhook`] pairs a handler with
//! one event and runs the lifecycle around it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::event::Event;
use crate::services::{customer_service, exception_service};
use crate::store::BillingStore;
use crate::stripe::StripeApi;
use crate::webhooks::signal::Signal;

/// Dependencies available to handlers while processing.
#[derive(Clone, Copy)]
pub struct WebhookContext<'a> {
    pub store: &'a dyn BillingStore,
    pub stripe: &'a dyn StripeApi,
}

/// Per-kind processing logic.
///
/// Implementors declare the event kind they handle through [`name`]; the
/// registry keys them by it.
///
/// [`name`]: WebhookHandler::name
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Event kind handled, e.g. `transfer.created`.
    fn name(&self) -> &str;

    /// What the processor sends this kind for, shown in the kind listing.
    fn description(&self) -> &str {
        ""
    }

    /// Mirror whatever the event changed. The default does nothing.
    async fn process_webhook(&self, _ctx: WebhookContext<'_>, _event: &Event) -> AppResult<()> {
        Ok(())
    }
}

/// Result of [`Webhook::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event had already been processed; nothing ran.
    AlreadyProcessed,
    /// The processor's copy of the event differs from the posted one.
    Invalid,
    Processed,
}

/// A handler bound to one event.
pub struct Webhook {
    /// Kind this webhook answers to. Signals only fire while it matches the
    /// event's kind.
    pub name: String,
    handler: Arc<dyn WebhookHandler>,
    signal: Option<Arc<Signal>>,
    event: Event,
}

impl Webhook {
    /// Bind `handler` to `event`.
    ///
    /// # Errors
    ///
    /// - `EventKindMismatch`: the event's kind is not the handler's
    pub fn new(
        handler: Arc<dyn WebhookHandler>,
        signal: Option<Arc<Signal>>,
        event: Event,
    ) -> AppResult<Self> {
        if handler.name() != event.kind {
            return Err(AppError::EventKindMismatch {
                handler: handler.name().to_string(),
                event: event.kind.clone(),
            });
        }

        Ok(Self {
            name: handler.name().to_string(),
            handler,
            signal,
            event,
        })
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Re-fetch the event from the processor and compare payloads.
    ///
    /// The fetched copy is stored as the validated message. The event is
    /// valid when the fetched copy is the same event (same `id` and `type`)
    /// and the `data` sections of both copies are equal.
    pub async fn validate(&mut self, ctx: WebhookContext<'_>) -> AppResult<()> {
        let fetched = ctx
            .stripe
            .retrieve_event(&self.event.stripe_id, self.event.stripe_account.as_deref())
            .await?;

        let same_event = fetched.get("id").and_then(Value::as_str)
            == Some(self.event.stripe_id.as_str())
            && fetched.get("type").and_then(Value::as_str) == Some(self.event.kind.as_str());
        let valid = same_event && self.event.webhook_message.get("data") == fetched.get("data");
        self.event.valid = Some(valid);
        self.event.validated_message = Some(fetched);
        ctx.store.save_event(&self.event).await?;

        if !valid {
            tracing::warn!(
                event_id = %self.event.stripe_id,
                kind = %self.event.kind,
                "Posted event does not match processor copy"
            );
        }

        Ok(())
    }

    /// Run the full lifecycle for the bound event.
    ///
    /// # Process
    ///
    /// 1. Return immediately if the event is already processed
    /// 2. Validate against the processor copy; stop if invalid
    /// 3. Link the event to its customer
    /// 4. Run the handler's [`process_webhook`](WebhookHandler::process_webhook)
    /// 5. Send the kind's signal
    /// 6. Mark the event processed
    ///
    /// # Errors
    ///
    /// Any error from steps 2-6 is written to the exception log against the
    /// event and then returned. A failure to write the log entry is only
    /// traced; the processing error is what the caller gets.
    pub async fn process(&mut self, ctx: WebhookContext<'_>) -> AppResult<ProcessOutcome> {
        if self.event.processed {
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        match self.run(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                if let Err(log_error) =
                    exception_service::log_exception(ctx.store, None, &error, Some(self.event.id))
                        .await
                {
                    tracing::error!(
                        event_id = %self.event.stripe_id,
                        error = %log_error,
                        "Failed to record processing exception"
                    );
                }
                Err(error)
            }
        }
    }

    async fn run(&mut self, ctx: WebhookContext<'_>) -> AppResult<ProcessOutcome> {
        self.validate(ctx).await?;
        if self.event.valid != Some(true) {
            return Ok(ProcessOutcome::Invalid);
        }

        customer_service::link_customer(ctx.store, &mut self.event).await?;
        self.handler.process_webhook(ctx, &self.event).await?;
        self.send_signal().await;

        self.event.processed = true;
        ctx.store.save_event(&self.event).await?;

        tracing::info!(
            event_id = %self.event.stripe_id,
            kind = %self.event.kind,
            "Event processed"
        );

        Ok(ProcessOutcome::Processed)
    }

    /// Notify the kind's receivers, if this webhook still answers to the
    /// event's kind. Returns how many receivers succeeded.
    pub async fn send_signal(&self) -> usize {
        if self.name != self.event.kind {
            return 0;
        }
        match &self.signal {
            Some(signal) => signal.send(&self.event).await,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::stripe::StripeError;
    use crate::test_support::{MockStripe, RecordingReceiver, event, stored_event};
    use serde_json::json;

    const KIND: &str = "account.application.deauthorized";

    struct Quiet;

    #[async_trait]
    impl WebhookHandler for Quiet {
        fn name(&self) -> &str {
            KIND
        }
    }

    struct Failing;

    #[async_trait]
    impl WebhookHandler for Failing {
        fn name(&self) -> &str {
            KIND
        }

        async fn process_webhook(&self, _ctx: WebhookContext<'_>, _event: &Event) -> AppResult<()> {
            Err(AppError::Stripe(StripeError::Api {
                status: 400,
                message: "Message".into(),
                body: "error".into(),
            }))
        }
    }

    fn message() -> serde_json::Value {
        json!({"id": "evt_dea", "type": KIND, "livemode": false, "data": {"object": {"id": "ca_1"}}})
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let result = Webhook::new(Arc::new(Quiet), None, event("account.updated", json!({})));
        assert!(matches!(
            result,
            Err(AppError::EventKindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn send_signal_reaches_receivers() {
        let signal = Arc::new(Signal::new(KIND));
        let recorder = Arc::new(RecordingReceiver::default());
        signal.connect(recorder.clone());

        let webhook = Webhook::new(Arc::new(Quiet), Some(signal), event(KIND, message())).unwrap();

        assert_eq!(webhook.send_signal().await, 1);
        assert_eq!(recorder.received(), vec!["evt_dea".to_string()]);
    }

    #[tokio::test]
    async fn renamed_webhook_sends_nothing() {
        let signal = Arc::new(Signal::new(KIND));
        let recorder = Arc::new(RecordingReceiver::default());
        signal.connect(recorder.clone());

        let mut webhook =
            Webhook::new(Arc::new(Quiet), Some(signal), event(KIND, message())).unwrap();
        webhook.name = "mismatch name".to_string();

        assert_eq!(webhook.send_signal().await, 0);
        assert!(recorder.received().is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_logged_and_returned() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        stripe.add_event(message()).await;
        let ev = stored_event(&store, message()).await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Failing), None, ev.clone()).unwrap();
        let err = webhook.process(ctx).await.unwrap_err();

        assert!(matches!(err, AppError::Stripe(_)));
        let logged = store.exceptions_for_event(ev.id).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].data, "error");
        let stored = store.find_event_by_stripe_id("evt_dea").await.unwrap().unwrap();
        assert!(!stored.processed);
    }

    #[tokio::test]
    async fn processing_marks_event_once() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        stripe.add_event(message()).await;
        let ev = stored_event(&store, message()).await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Quiet), None, ev).unwrap();
        assert_eq!(webhook.process(ctx).await.unwrap(), ProcessOutcome::Processed);
        assert!(webhook.event().processed);
        assert_eq!(webhook.event().valid, Some(true));

        assert_eq!(
            webhook.process(ctx).await.unwrap(),
            ProcessOutcome::AlreadyProcessed
        );
        assert_eq!(stripe.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn tampered_event_is_not_processed() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let mut remote = message();
        remote["data"]["object"]["id"] = json!("ca_other");
        stripe.add_event(remote).await;
        let ev = stored_event(&store, message()).await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Quiet), None, ev).unwrap();

        assert_eq!(webhook.process(ctx).await.unwrap(), ProcessOutcome::Invalid);
        let stored = store.find_event_by_stripe_id("evt_dea").await.unwrap().unwrap();
        assert_eq!(stored.valid, Some(false));
        assert!(!stored.processed);
    }

    #[tokio::test]
    async fn fetched_copy_of_another_event_is_invalid() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let mut remote = message();
        remote["type"] = json!("account.updated");
        stripe.add_event(remote).await;
        let ev = stored_event(&store, message()).await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Quiet), None, ev).unwrap();

        assert_eq!(webhook.process(ctx).await.unwrap(), ProcessOutcome::Invalid);
        assert_eq!(webhook.event().valid, Some(false));
    }

    #[tokio::test]
    async fn fetched_object_without_data_is_invalid() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let posted = json!({"id": "evt_dea", "type": KIND, "livemode": true});
        stripe
            .add_event(json!({"id": "evt_dea", "object": "customer"}))
            .await;
        let ev = stored_event(&store, posted).await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Quiet), None, ev).unwrap();

        assert_eq!(webhook.process(ctx).await.unwrap(), ProcessOutcome::Invalid);
        assert!(!webhook.event().processed);
    }

    #[tokio::test]
    async fn processing_error_survives_exception_log_failure() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        stripe.add_event(message()).await;
        let ev = stored_event(&store, message()).await;
        store.close_exception_log().await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Failing), None, ev.clone()).unwrap();
        let err = webhook.process(ctx).await.unwrap_err();

        assert!(matches!(err, AppError::Stripe(_)));
        assert!(store.exceptions_for_event(ev.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_remote_event_is_logged() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let ev = stored_event(&store, message()).await;
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        let mut webhook = Webhook::new(Arc::new(Quiet), None, ev.clone()).unwrap();

        assert!(webhook.process(ctx).await.is_err());
        assert_eq!(store.exceptions_for_event(ev.id).await.unwrap().len(), 1);
    }
}
