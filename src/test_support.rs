//! Shared fixtures and doubles for unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::models::event::{Event, EventEnvelope};
use crate::store::{BillingStore, MemoryStore};
use crate::stripe::objects::{List, StripeCharge, StripeCustomer, StripeTransfer};
use crate::stripe::{ListParams, StripeApi, StripeError};
use crate::webhooks::SignalReceiver;

/// Unsaved event of `kind` carrying `webhook_message`.
///
/// The processor id is taken from the message's `id` when it is a string.
pub fn event(kind: &str, webhook_message: Value) -> Event {
    Event {
        id: Uuid::new_v4(),
        stripe_id: webhook_message
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("evt_test")
            .to_string(),
        kind: kind.to_string(),
        livemode: false,
        customer_id: None,
        stripe_account: None,
        webhook_message,
        validated_message: None,
        valid: None,
        processed: false,
        request: String::new(),
        pending_webhooks: 0,
        api_version: String::new(),
        created_at: Utc::now(),
    }
}

/// Insert `message` into `store` as a freshly received event.
pub async fn stored_event(store: &MemoryStore, message: Value) -> Event {
    let envelope = EventEnvelope::from_value(message).unwrap();
    store.insert_event(&envelope).await.unwrap().unwrap()
}

/// Records the processor id of every event it receives.
#[derive(Default)]
pub struct RecordingReceiver {
    seen: Mutex<Vec<String>>,
}

impl RecordingReceiver {
    pub fn received(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SignalReceiver for RecordingReceiver {
    async fn receive(&self, event: &Event) -> anyhow::Result<()> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.stripe_id.clone());
        Ok(())
    }
}

/// In-memory processor API.
///
/// Objects are served by id; unknown ids answer like the real API does,
/// with a 404 and an error body. Every retrieve is recorded as
/// `"<object>:<id>"` and every list page as `"list:<object>"`, each with an
/// `"@<account>"` suffix when a connected account was selected.
///
/// List endpoints return [`MockStripe::PAGE_SIZE`] objects per page, ordered
/// by id, so callers have to follow `has_more`.
#[derive(Default)]
pub struct MockStripe {
    objects: tokio::sync::Mutex<HashMap<String, Value>>,
    calls: tokio::sync::Mutex<Vec<String>>,
}

impl MockStripe {
    pub const PAGE_SIZE: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    async fn add(&self, object: &str, value: Value) {
        let id = value["id"].as_str().unwrap_or_default().to_string();
        self.objects
            .lock()
            .await
            .insert(format!("{object}:{id}"), value);
    }

    pub async fn add_event(&self, event: Value) {
        self.add("event", event).await;
    }

    pub async fn add_customer(&self, customer: Value) {
        self.add("customer", customer).await;
    }

    pub async fn add_charge(&self, charge: Value) {
        self.add("charge", charge).await;
    }

    pub async fn add_invoice(&self, invoice: Value) {
        self.add("invoice", invoice).await;
    }

    pub async fn add_transfer(&self, transfer: Value) {
        self.add("transfer", transfer).await;
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String, stripe_account: Option<&str>) {
        let call = match stripe_account {
            Some(account) => format!("{call}@{account}"),
            None => call,
        };
        self.calls.lock().await.push(call);
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        object: &str,
        id: &str,
        stripe_account: Option<&str>,
    ) -> Result<T, StripeError> {
        let key = format!("{object}:{id}");
        self.record(key.clone(), stripe_account).await;

        let found = self.objects.lock().await.get(&key).cloned();
        match found {
            Some(value) => serde_json::from_value(value).map_err(StripeError::Decode),
            None => {
                let message = format!("No such {object}: {id}");
                Err(StripeError::Api {
                    status: 404,
                    body: json!({"error": {"type": "invalid_request_error", "message": message}})
                        .to_string(),
                    message,
                })
            }
        }
    }

    async fn page<T: DeserializeOwned>(
        &self,
        object: &str,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<T>, StripeError> {
        self.record(format!("list:{object}"), stripe_account).await;

        let prefix = format!("{object}:");
        let mut matching: Vec<(String, Value)> = self
            .objects
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, value)| match params.customer {
                Some(customer) => value["customer"].as_str() == Some(customer),
                None => true,
            })
            .map(|(key, value)| (key[prefix.len()..].to_string(), value.clone()))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(&b.0));

        let rest: Vec<Value> = matching
            .into_iter()
            .filter(|(id, _)| params.starting_after.is_none_or(|after| id.as_str() > after))
            .map(|(_, value)| value)
            .collect();
        let has_more = rest.len() > Self::PAGE_SIZE;
        let data = rest
            .into_iter()
            .take(Self::PAGE_SIZE)
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(StripeError::Decode)?;

        Ok(List { data, has_more })
    }
}

#[async_trait]
impl StripeApi for MockStripe {
    async fn retrieve_event(
        &self,
        event_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<Value, StripeError> {
        self.fetch("event", event_id, stripe_account).await
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeCustomer, StripeError> {
        self.fetch("customer", customer_id, stripe_account).await
    }

    async fn retrieve_charge(
        &self,
        charge_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeCharge, StripeError> {
        self.fetch("charge", charge_id, stripe_account).await
    }

    async fn retrieve_transfer(
        &self,
        transfer_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeTransfer, StripeError> {
        self.fetch("transfer", transfer_id, stripe_account).await
    }

    async fn list_customers(
        &self,
        params: ListParams<'_>,
    ) -> Result<List<StripeCustomer>, StripeError> {
        let params = ListParams {
            customer: None,
            ..params
        };
        self.page("customer", params, None).await
    }

    async fn list_charges(
        &self,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<StripeCharge>, StripeError> {
        self.page("charge", params, stripe_account).await
    }

    async fn list_invoices(
        &self,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<Value>, StripeError> {
        self.page("invoice", params, stripe_account).await
    }
}

/// `transfer.created` for a paid 4.55 USD transfer.
pub fn transfer_created() -> Value {
    json!({
        "created": 1364658818,
        "data": {
            "object": {
                "account": {
                    "bank_name": "BANK OF AMERICA, N.A.",
                    "country": "US",
                    "last4": "9999",
                    "object": "bank_account"
                },
                "amount": 455,
                "currency": "usd",
                "date": 1364601600,
                "description": "STRIPE TRANSFER",
                "fee": 0,
                "fee_details": [],
                "id": "tr_XXXXXXXXXXXX",
                "livemode": true,
                "object": "transfer",
                "other_transfers": [],
                "status": "paid",
                "summary": {
                    "charge_count": 1,
                    "charge_fees": 45,
                    "charge_gross": 500,
                    "currency": "usd",
                    "net": 455
                }
            }
        },
        "id": "evt_XXXXXXXXXXXX",
        "livemode": true,
        "object": "event",
        "pending_webhooks": 1,
        "type": "transfer.created"
    })
}

/// `transfer.created` for a pending 9.41 USD transfer.
pub fn transfer_pending() -> Value {
    json!({
        "created": 1375603198,
        "data": {
            "object": {
                "account": {
                    "bank_name": "BANK OF AMERICA, N.A.",
                    "country": "US",
                    "fingerprint": "xxxxxxxxxx",
                    "last4": "4444",
                    "object": "bank_account",
                    "validated": false
                },
                "amount": 941,
                "currency": "usd",
                "date": 1375747200,
                "description": "STRIPE TRANSFER",
                "fee": 0,
                "fee_details": [],
                "id": "tr_adlkj2l3kj23",
                "livemode": true,
                "object": "transfer",
                "recipient": null,
                "statement_descriptor": null,
                "status": "pending"
            }
        },
        "id": "evt_2l3kj232k223",
        "livemode": true,
        "object": "event",
        "pending_webhooks": 1,
        "request": null,
        "type": "transfer.created"
    })
}

/// `transfer.paid` for the transfer in [`transfer_created`].
pub fn transfer_paid() -> Value {
    let mut paid = transfer_created();
    paid["id"] = json!("evt_YYYYYYYYYYYY");
    paid["type"] = json!("transfer.paid");
    paid["created"] = json!(1364658819);
    paid
}
