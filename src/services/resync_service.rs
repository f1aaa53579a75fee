//! Bulk resynchronisation of the mirror from the processor's list endpoints.
//!
//! Webhooks are the normal path into the mirror, but a missed or failed
//! delivery is never retried once the event id is known. These routines walk
//! the processor's collections instead and re-apply the regular sync
//! functions to every object.

use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::customer::Customer;
use crate::services::{charge_service, customer_service, invoice_service};
use crate::store::BillingStore;
use crate::stripe::{ListParams, StripeApi, StripeError};

/// Counts from a full resync.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub customers_synced: usize,

    /// Customers that had no local row before this run
    pub customers_created: usize,

    pub customers_skipped: usize,
    pub charges_synced: usize,

    /// Charges whose customer is not mirrored locally
    pub charges_skipped: usize,

    pub invoices_synced: usize,
    pub invoices_skipped: usize,
}

/// Counts from resyncing one customer.
#[derive(Debug, Clone)]
pub struct CustomerResync {
    pub customer: Customer,
    pub invoices_synced: usize,
    pub charges_synced: usize,
}

/// Errors that skip one object instead of aborting the run.
///
/// A missing local record, an object of unexpected shape, or an API refusal
/// for that object. Store and transport failures still abort.
fn is_skippable(error: &AppError) -> bool {
    matches!(
        error,
        AppError::NotFound(_)
            | AppError::InvalidObject(_)
            | AppError::Stripe(StripeError::Api { .. })
    )
}

/// Resync customers, then charges, then invoices, across the whole
/// platform account.
///
/// # Process
///
/// 1. Every processor customer gets a local row (created if missing) and is
///    synced from the listed object
/// 2. Every charge is mirrored; charges of unknown customers are skipped
/// 3. Every invoice is mirrored; invoices of unknown customers are skipped
///
/// # Errors
///
/// - `Stripe`: a list page could not be fetched
/// - `Database`: store failure
pub async fn resync_all(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
) -> AppResult<ResyncReport> {
    let mut report = ResyncReport::default();

    resync_customers(store, stripe, &mut report).await?;
    resync_charges(store, stripe, &mut report).await?;
    resync_invoices(store, stripe, &mut report).await?;

    tracing::info!(
        customers_synced = report.customers_synced,
        customers_created = report.customers_created,
        customers_skipped = report.customers_skipped,
        charges_synced = report.charges_synced,
        charges_skipped = report.charges_skipped,
        invoices_synced = report.invoices_synced,
        invoices_skipped = report.invoices_skipped,
        "Resync finished"
    );

    Ok(report)
}

async fn resync_customers(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    report: &mut ResyncReport,
) -> AppResult<()> {
    let mut cursor: Option<String> = None;

    loop {
        let page = stripe
            .list_customers(ListParams {
                customer: None,
                starting_after: cursor.as_deref(),
            })
            .await?;

        for data in &page.data {
            let customer = match store.find_customer_by_stripe_id(&data.id).await? {
                Some(customer) => customer,
                None => {
                    report.customers_created += 1;
                    store.get_or_create_customer(&data.id).await?
                }
            };

            let synced =
                customer_service::sync_customer(store, stripe, &customer, Some(data.clone()), None)
                    .await;
            match synced {
                Ok(_) => report.customers_synced += 1,
                Err(error) if is_skippable(&error) => {
                    tracing::warn!(customer_id = %data.id, error = %error, "Customer skipped");
                    report.customers_skipped += 1;
                }
                Err(error) => return Err(error),
            }
        }

        cursor = page.next_cursor(|customer| Some(customer.id.as_str()));
        if cursor.is_none() {
            return Ok(());
        }
    }
}

async fn resync_charges(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    report: &mut ResyncReport,
) -> AppResult<()> {
    let mut cursor: Option<String> = None;

    loop {
        let page = stripe
            .list_charges(
                ListParams {
                    customer: None,
                    starting_after: cursor.as_deref(),
                },
                None,
            )
            .await?;

        for data in &page.data {
            match charge_service::sync_charge_from_stripe_data(store, data).await {
                Ok(_) => report.charges_synced += 1,
                Err(error @ AppError::NotFound(_)) => {
                    tracing::warn!(charge_id = %data.id, error = %error, "Charge skipped");
                    report.charges_skipped += 1;
                }
                Err(error) => return Err(error),
            }
        }

        cursor = page.next_cursor(|charge| Some(charge.id.as_str()));
        if cursor.is_none() {
            return Ok(());
        }
    }
}

async fn resync_invoices(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    report: &mut ResyncReport,
) -> AppResult<()> {
    let mut cursor: Option<String> = None;

    loop {
        let page = stripe
            .list_invoices(
                ListParams {
                    customer: None,
                    starting_after: cursor.as_deref(),
                },
                None,
            )
            .await?;

        for object in &page.data {
            match invoice_service::sync_invoice(store, stripe, object, None).await {
                Ok(_) => report.invoices_synced += 1,
                Err(error) if is_skippable(&error) => {
                    tracing::warn!(
                        invoice_id = ?object.get("id").and_then(serde_json::Value::as_str),
                        error = %error,
                        "Invoice skipped"
                    );
                    report.invoices_skipped += 1;
                }
                Err(error) => return Err(error),
            }
        }

        cursor = page.next_cursor(|object| object.get("id").and_then(Value::as_str));
        if cursor.is_none() {
            return Ok(());
        }
    }
}

/// Re-fetch one customer, then mirror its invoices and charges.
///
/// A customer that is (or turns out to be) purged is returned without
/// touching its invoices or charges.
pub async fn resync_customer(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    customer: &Customer,
) -> AppResult<CustomerResync> {
    let customer = customer_service::sync_customer(store, stripe, customer, None, None).await?;
    if customer.date_purged.is_some() {
        return Ok(CustomerResync {
            customer,
            invoices_synced: 0,
            charges_synced: 0,
        });
    }

    // Invoices first so charges can link to them.
    let invoices_synced =
        invoice_service::sync_invoices_for_customer(store, stripe, &customer).await?;
    let charges_synced =
        charge_service::sync_charges_for_customer(store, stripe, &customer).await?;

    Ok(CustomerResync {
        customer,
        invoices_synced,
        charges_synced,
    })
}
