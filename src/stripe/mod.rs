//! Payment processor API access.
//!
//! Webhook bodies are never trusted on their own: events are re-fetched
//! through [`StripeApi`] before processing, and some handlers re-fetch the
//! object they are about to mirror. Production uses [`client::StripeClient`];
//! tests substitute a mock.

pub mod client;
pub mod objects;

use async_trait::async_trait;
use serde_json::Value;

use objects::{List, StripeCharge, StripeCustomer, StripeTransfer};

pub use client::StripeClient;

/// Errors returned by the processor API client.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// The HTTP request could not be completed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    ///
    /// `body` is the raw response body, kept for the exception log.
    #[error("API returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        body: String,
    },

    /// The API answered 2xx but the body was not the expected object.
    #[error("unexpected response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The configured API base is not a usable URL.
    #[error("invalid API base: {0}")]
    BaseUrl(String),

    /// An object id that cannot name a single path segment.
    #[error("invalid object id {0:?}")]
    InvalidId(String),
}

/// Filters and cursor for the list endpoints.
///
/// Pages are walked by passing the last id of one page as `starting_after`
/// of the next, until a page comes back with `has_more` unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListParams<'a> {
    /// Only objects belonging to this customer
    pub customer: Option<&'a str>,
    pub starting_after: Option<&'a str>,
}

/// Read access to the processor objects the sync pipeline depends on.
///
/// `stripe_account` selects a connected account when set.
#[async_trait]
pub trait StripeApi: Send + Sync {
    /// Fetch the authoritative copy of an event, as raw JSON.
    async fn retrieve_event(
        &self,
        event_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<Value, StripeError>;

    /// Fetch a customer, including embedded sources and subscriptions.
    async fn retrieve_customer(
        &self,
        customer_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeCustomer, StripeError>;

    /// Fetch a charge with its balance transaction expanded.
    async fn retrieve_charge(
        &self,
        charge_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeCharge, StripeError>;

    /// Fetch a transfer.
    async fn retrieve_transfer(
        &self,
        transfer_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeTransfer, StripeError>;

    /// One page of customers. `params.customer` is ignored.
    async fn list_customers(
        &self,
        params: ListParams<'_>,
    ) -> Result<List<StripeCustomer>, StripeError>;

    /// One page of charges, balance transactions expanded.
    async fn list_charges(
        &self,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<StripeCharge>, StripeError>;

    /// One page of invoices, as raw JSON for the invoice sync.
    async fn list_invoices(
        &self,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<Value>, StripeError>;
}
