//! Persistence for the event log and the billing mirror.
//!
//! [`BillingStore`] is the seam between the sync pipeline and the database.
//! [`postgres::PgStore`] backs the running service; [`memory::MemoryStore`]
//! keeps everything in process for tests and local experiments.
//!
//! All `upsert_*` methods are keyed by the processor id and are idempotent:
//! applying the same upsert twice leaves one row with the same contents.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
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

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> AppResult<()>;

    async fn find_active_api_key(&self, key_hash: &str) -> AppResult<Option<ApiKey>>;

    // Events

    async fn find_event_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Event>>;

    /// Insert an event unless one with the same `stripe_id` exists.
    ///
    /// Returns `None` when the event already existed; the existing row is
    /// left untouched.
    async fn insert_event(&self, envelope: &EventEnvelope) -> AppResult<Option<Event>>;

    /// Persist the mutable fields of an event: validation, processing state
    /// and customer link.
    async fn save_event(&self, event: &Event) -> AppResult<()>;

    /// Most recent events first.
    async fn list_events(&self, limit: i64) -> AppResult<Vec<Event>>;

    async fn insert_exception(
        &self,
        exception: NewEventProcessingException,
    ) -> AppResult<EventProcessingException>;

    async fn exceptions_for_event(&self, event_id: Uuid)
    -> AppResult<Vec<EventProcessingException>>;

    // Customers

    async fn find_customer_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Customer>>;

    async fn find_customer(&self, id: Uuid) -> AppResult<Option<Customer>>;

    /// Fetch the customer with this processor id, creating an empty one if
    /// none exists.
    async fn get_or_create_customer(&self, stripe_id: &str) -> AppResult<Customer>;

    async fn update_customer(&self, id: Uuid, update: CustomerUpdate) -> AppResult<Customer>;

    /// Mark a customer purged. Purged customers keep their row.
    async fn purge_customer(&self, id: Uuid) -> AppResult<()>;

    // Transfers

    async fn upsert_transfer(&self, transfer: TransferUpsert) -> AppResult<Transfer>;

    async fn find_transfer_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Transfer>>;

    async fn update_transfer_status(&self, id: Uuid, status: &str) -> AppResult<Transfer>;

    /// Transfers whose `date` falls in the given calendar month (UTC).
    async fn transfers_during(&self, year: i32, month: u32) -> AppResult<Vec<Transfer>>;

    // Charges

    async fn upsert_charge(&self, charge: ChargeUpsert) -> AppResult<Charge>;

    async fn find_charge_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Charge>>;

    /// Paid, captured charges that can still change availability: all of
    /// them except those both available and refunded.
    async fn charges_awaiting_availability(&self) -> AppResult<Vec<Charge>>;

    // Invoices

    async fn upsert_invoice(&self, invoice: InvoiceUpsert) -> AppResult<Invoice>;

    async fn find_invoice_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Invoice>>;

    // Subscriptions

    async fn upsert_subscription(&self, subscription: SubscriptionUpsert)
    -> AppResult<Subscription>;

    async fn find_subscription_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> AppResult<Option<Subscription>>;

    // Cards

    async fn upsert_card(&self, card: CardUpsert) -> AppResult<Card>;

    async fn find_card_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Card>>;

    /// Returns whether a row was deleted.
    async fn delete_card(&self, stripe_id: &str) -> AppResult<bool>;

    // Connected accounts

    async fn get_or_create_account(&self, stripe_id: &str) -> AppResult<Account>;
}
