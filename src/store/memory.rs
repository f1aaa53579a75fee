//! In-process implementation of [`BillingStore`].
//!
//! Everything lives behind one `tokio::sync::RwLock`, so each method is
//! atomic with respect to the others. Data is lost when the process exits.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::BillingStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    account::Account,
    api_key::ApiKey,
    card::{Card, CardUpsert},
    charge::{Charge, ChargeUpsert},
    customer::{Customer, CustomerUpdate},
    event::{Event, EventEnvelope, EventProcessingException, NewEventProcessingException},
    invoice::{Invoice, InvoiceUpsert},
    subscription::{Subscription, SubscriptionUpsert},
    transfer::{Transfer, TransferUpsert},
};

#[derive(Default)]
struct Tables {
    api_keys: Vec<ApiKey>,
    // Insertion order doubles as creation order.
    events: Vec<Event>,
    exceptions: Vec<EventProcessingException>,
    customers: HashMap<String, Customer>,
    accounts: HashMap<String, Account>,
    transfers: HashMap<String, Transfer>,
    charges: HashMap<String, Charge>,
    invoices: HashMap<String, Invoice>,
    subscriptions: HashMap<String, Subscription>,
    cards: HashMap<String, Card>,
    exception_log_closed: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active admin key by its hash.
    pub async fn add_api_key(&self, key_hash: &str, owner_name: &str) -> ApiKey {
        let key = ApiKey {
            id: Uuid::new_v4(),
            key_hash: key_hash.to_string(),
            owner_name: owner_name.to_string(),
            created_at: Utc::now(),
            is_active: true,
        };
        self.tables.write().await.api_keys.push(key.clone());
        key
    }

    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }

    /// Make every later `insert_exception` fail as if the pool had closed.
    pub async fn close_exception_log(&self) {
        self.tables.write().await.exception_log_closed = true;
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn find_active_api_key(&self, key_hash: &str) -> AppResult<Option<ApiKey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .api_keys
            .iter()
            .find(|k| k.key_hash == key_hash && k.is_active)
            .cloned())
    }

    async fn find_event_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .find(|e| e.stripe_id == stripe_id)
            .cloned())
    }

    async fn insert_event(&self, envelope: &EventEnvelope) -> AppResult<Option<Event>> {
        let mut tables = self.tables.write().await;
        if tables.events.iter().any(|e| e.stripe_id == envelope.stripe_id) {
            return Ok(None);
        }

        let event = Event {
            id: Uuid::new_v4(),
            stripe_id: envelope.stripe_id.clone(),
            kind: envelope.kind.clone(),
            livemode: envelope.livemode,
            customer_id: None,
            stripe_account: envelope.stripe_account.clone(),
            webhook_message: envelope.raw.clone(),
            validated_message: None,
            valid: None,
            processed: false,
            request: envelope.request.clone(),
            pending_webhooks: envelope.pending_webhooks,
            api_version: envelope.api_version.clone(),
            created_at: Utc::now(),
        };
        tables.events.push(event.clone());
        Ok(Some(event))
    }

    async fn save_event(&self, event: &Event) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| AppError::NotFound(format!("Event {}", event.stripe_id)))?;

        stored.validated_message = event.validated_message.clone();
        stored.valid = event.valid;
        stored.processed = event.processed;
        stored.customer_id = event.customer_id;
        Ok(())
    }

    async fn list_events(&self, limit: i64) -> AppResult<Vec<Event>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.tables.read().await;
        Ok(tables.events.iter().rev().take(limit).cloned().collect())
    }

    async fn insert_exception(
        &self,
        exception: NewEventProcessingException,
    ) -> AppResult<EventProcessingException> {
        let mut tables = self.tables.write().await;
        if tables.exception_log_closed {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }

        let row = EventProcessingException {
            id: Uuid::new_v4(),
            event_id: exception.event_id,
            data: exception.data,
            message: exception.message,
            traceback: exception.traceback,
            created_at: Utc::now(),
        };
        tables.exceptions.push(row.clone());
        Ok(row)
    }

    async fn exceptions_for_event(
        &self,
        event_id: Uuid,
    ) -> AppResult<Vec<EventProcessingException>> {
        let tables = self.tables.read().await;
        Ok(tables
            .exceptions
            .iter()
            .filter(|x| x.event_id == Some(event_id))
            .cloned()
            .collect())
    }

    async fn find_customer_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(stripe_id).cloned())
    }

    async fn find_customer(&self, id: Uuid) -> AppResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().find(|c| c.id == id).cloned())
    }

    async fn get_or_create_customer(&self, stripe_id: &str) -> AppResult<Customer> {
        let mut tables = self.tables.write().await;
        let customer = tables
            .customers
            .entry(stripe_id.to_string())
            .or_insert_with(|| Customer {
                id: Uuid::new_v4(),
                stripe_id: stripe_id.to_string(),
                account_balance: None,
                currency: String::new(),
                delinquent: false,
                default_source: String::new(),
                date_purged: None,
                created_at: Utc::now(),
            });
        Ok(customer.clone())
    }

    async fn update_customer(&self, id: Uuid, update: CustomerUpdate) -> AppResult<Customer> {
        let mut tables = self.tables.write().await;
        let customer = tables
            .customers
            .values_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Customer {id}")))?;

        customer.account_balance = update.account_balance;
        customer.currency = update.currency;
        customer.delinquent = update.delinquent;
        customer.default_source = update.default_source;
        Ok(customer.clone())
    }

    async fn purge_customer(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(customer) = tables.customers.values_mut().find(|c| c.id == id) {
            customer.date_purged = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_transfer(&self, t: TransferUpsert) -> AppResult<Transfer> {
        let mut tables = self.tables.write().await;
        let (id, created_at) = match tables.transfers.get(&t.stripe_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), Utc::now()),
        };

        let transfer = Transfer {
            id,
            stripe_id: t.stripe_id,
            amount: t.amount,
            amount_reversed: t.amount_reversed,
            application_fee: t.application_fee,
            created: t.created,
            currency: t.currency,
            date: t.date,
            description: t.description,
            destination: t.destination,
            destination_payment: t.destination_payment,
            event_id: t.event_id,
            failure_code: t.failure_code,
            failure_message: t.failure_message,
            livemode: t.livemode,
            metadata: t.metadata,
            method: t.method,
            reversed: t.reversed,
            source_transaction: t.source_transaction,
            source_type: t.source_type,
            statement_descriptor: t.statement_descriptor,
            status: t.status,
            transfer_group: t.transfer_group,
            transfer_type: t.transfer_type,
            created_at,
        };
        tables
            .transfers
            .insert(transfer.stripe_id.clone(), transfer.clone());
        Ok(transfer)
    }

    async fn find_transfer_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Transfer>> {
        Ok(self.tables.read().await.transfers.get(stripe_id).cloned())
    }

    async fn update_transfer_status(&self, id: Uuid, status: &str) -> AppResult<Transfer> {
        let mut tables = self.tables.write().await;
        let transfer = tables
            .transfers
            .values_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Transfer {id}")))?;

        transfer.status = status.to_string();
        Ok(transfer.clone())
    }

    async fn transfers_during(&self, year: i32, month: u32) -> AppResult<Vec<Transfer>> {
        let tables = self.tables.read().await;
        let mut transfers: Vec<Transfer> = tables
            .transfers
            .values()
            .filter(|t| {
                t.date
                    .is_some_and(|date| date.year() == year && date.month() == month)
            })
            .cloned()
            .collect();
        transfers.sort_by_key(|t| t.date);
        Ok(transfers)
    }

    async fn upsert_charge(&self, c: ChargeUpsert) -> AppResult<Charge> {
        let mut tables = self.tables.write().await;
        let existing = tables.charges.get(&c.stripe_id).cloned();

        let (available, available_on) = match (c.available, &existing) {
            (Some(available), _) => (available, c.available_on),
            (None, Some(prev)) => (prev.available, prev.available_on),
            (None, None) => (false, None),
        };

        let charge = Charge {
            id: existing.as_ref().map_or_else(Uuid::new_v4, |prev| prev.id),
            stripe_id: c.stripe_id,
            customer_id: c.customer_id,
            invoice_id: c.invoice_id,
            source: c.source,
            currency: c.currency,
            amount: c.amount,
            amount_refunded: c
                .amount_refunded
                .or_else(|| existing.as_ref().and_then(|prev| prev.amount_refunded)),
            description: c
                .description
                .or_else(|| existing.as_ref().map(|prev| prev.description.clone()))
                .unwrap_or_default(),
            paid: c.paid,
            disputed: c.disputed,
            refunded: c.refunded,
            captured: c.captured,
            available,
            available_on,
            charge_created: c.charge_created,
            created_at: existing.as_ref().map_or_else(Utc::now, |prev| prev.created_at),
        };
        tables
            .charges
            .insert(charge.stripe_id.clone(), charge.clone());
        Ok(charge)
    }

    async fn find_charge_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Charge>> {
        Ok(self.tables.read().await.charges.get(stripe_id).cloned())
    }

    async fn charges_awaiting_availability(&self) -> AppResult<Vec<Charge>> {
        let tables = self.tables.read().await;
        let mut charges: Vec<Charge> = tables
            .charges
            .values()
            .filter(|c| c.paid && c.captured && !(c.available && c.refunded))
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.created_at);
        Ok(charges)
    }

    async fn upsert_invoice(&self, i: InvoiceUpsert) -> AppResult<Invoice> {
        let mut tables = self.tables.write().await;
        let (id, created_at) = match tables.invoices.get(&i.stripe_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), Utc::now()),
        };

        let invoice = Invoice {
            id,
            stripe_id: i.stripe_id,
            customer_id: i.customer_id,
            charge: i.charge,
            subscription_id: i.subscription_id,
            amount_due: i.amount_due,
            attempted: i.attempted,
            attempt_count: i.attempt_count,
            closed: i.closed,
            paid: i.paid,
            period_start: i.period_start,
            period_end: i.period_end,
            subtotal: i.subtotal,
            total: i.total,
            date: i.date,
            currency: i.currency,
            created_at,
        };
        tables
            .invoices
            .insert(invoice.stripe_id.clone(), invoice.clone());
        Ok(invoice)
    }

    async fn find_invoice_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Invoice>> {
        Ok(self.tables.read().await.invoices.get(stripe_id).cloned())
    }

    async fn upsert_subscription(&self, s: SubscriptionUpsert) -> AppResult<Subscription> {
        let mut tables = self.tables.write().await;
        let (id, created_at) = match tables.subscriptions.get(&s.stripe_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), Utc::now()),
        };

        let subscription = Subscription {
            id,
            stripe_id: s.stripe_id,
            customer_id: s.customer_id,
            plan: s.plan,
            quantity: s.quantity,
            status: s.status,
            start: s.start,
            cancel_at_period_end: s.cancel_at_period_end,
            canceled_at: s.canceled_at,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            ended_at: s.ended_at,
            trial_start: s.trial_start,
            trial_end: s.trial_end,
            application_fee_percent: s.application_fee_percent,
            created_at,
        };
        tables
            .subscriptions
            .insert(subscription.stripe_id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn find_subscription_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self.tables.read().await.subscriptions.get(stripe_id).cloned())
    }

    async fn upsert_card(&self, c: CardUpsert) -> AppResult<Card> {
        let mut tables = self.tables.write().await;
        let (id, created_at) = match tables.cards.get(&c.stripe_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), Utc::now()),
        };

        let card = Card {
            id,
            stripe_id: c.stripe_id,
            customer_id: c.customer_id,
            name: c.name,
            brand: c.brand,
            country: c.country,
            exp_month: c.exp_month,
            exp_year: c.exp_year,
            fingerprint: c.fingerprint,
            funding: c.funding,
            last4: c.last4,
            cvc_check: c.cvc_check,
            created_at,
        };
        tables.cards.insert(card.stripe_id.clone(), card.clone());
        Ok(card)
    }

    async fn find_card_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Card>> {
        Ok(self.tables.read().await.cards.get(stripe_id).cloned())
    }

    async fn delete_card(&self, stripe_id: &str) -> AppResult<bool> {
        Ok(self.tables.write().await.cards.remove(stripe_id).is_some())
    }

    async fn get_or_create_account(&self, stripe_id: &str) -> AppResult<Account> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .entry(stripe_id.to_string())
            .or_insert_with(|| Account {
                id: Uuid::new_v4(),
                stripe_id: stripe_id.to_string(),
                created_at: Utc::now(),
            });
        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn transfer(stripe_id: &str, status: &str, date: (i32, u32, u32)) -> TransferUpsert {
        TransferUpsert {
            stripe_id: stripe_id.to_string(),
            amount: Decimal::new(455, 2),
            amount_reversed: None,
            application_fee: None,
            created: None,
            currency: "usd".to_string(),
            date: Utc.with_ymd_and_hms(date.0, date.1, date.2, 12, 0, 0).single(),
            description: None,
            destination: None,
            destination_payment: None,
            event_id: None,
            failure_code: None,
            failure_message: None,
            livemode: false,
            metadata: json!({}),
            method: None,
            reversed: false,
            source_transaction: None,
            source_type: None,
            statement_descriptor: None,
            status: status.to_string(),
            transfer_group: None,
            transfer_type: None,
        }
    }

    #[tokio::test]
    async fn upsert_transfer_keeps_identity() {
        let store = MemoryStore::new();
        let first = store
            .upsert_transfer(transfer("tr_1", "pending", (2017, 2, 1)))
            .await
            .unwrap();
        let second = store
            .upsert_transfer(transfer("tr_1", "paid", (2017, 2, 1)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, "paid");
        assert_eq!(store.tables.read().await.transfers.len(), 1);
    }

    #[tokio::test]
    async fn transfers_during_filters_by_calendar_month() {
        let store = MemoryStore::new();
        store
            .upsert_transfer(transfer("tr_feb", "paid", (2017, 2, 28)))
            .await
            .unwrap();
        store
            .upsert_transfer(transfer("tr_mar", "paid", (2017, 3, 1)))
            .await
            .unwrap();

        let feb = store.transfers_during(2017, 2).await.unwrap();
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].stripe_id, "tr_feb");
        assert!(store.transfers_during(2016, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_event_ignores_existing_id() {
        let store = MemoryStore::new();
        let envelope = EventEnvelope::from_value(json!({
            "id": "evt_1",
            "type": "ping",
            "livemode": false
        }))
        .unwrap();

        assert!(store.insert_event(&envelope).await.unwrap().is_some());
        assert!(store.insert_event(&envelope).await.unwrap().is_none());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn charge_upsert_keeps_availability_when_not_expanded() {
        let store = MemoryStore::new();
        let customer = store.get_or_create_customer("cus_1").await.unwrap();
        let upsert = ChargeUpsert {
            stripe_id: "ch_1".to_string(),
            customer_id: customer.id,
            invoice_id: None,
            source: "card_1".to_string(),
            currency: "usd".to_string(),
            amount: Decimal::new(1000, 2),
            amount_refunded: None,
            description: Some("first".to_string()),
            paid: true,
            disputed: false,
            refunded: false,
            captured: true,
            available: Some(true),
            available_on: None,
            charge_created: None,
        };
        store.upsert_charge(upsert.clone()).await.unwrap();

        let charge = store
            .upsert_charge(ChargeUpsert {
                available: None,
                description: None,
                ..upsert
            })
            .await
            .unwrap();

        assert!(charge.available);
        assert_eq!(charge.description, "first");
    }

    #[tokio::test]
    async fn inactive_keys_are_not_found() {
        let store = MemoryStore::new();
        store.add_api_key("abc", "ops").await;
        store.tables.write().await.api_keys[0].is_active = false;

        assert!(store.find_active_api_key("abc").await.unwrap().is_none());
    }
}
