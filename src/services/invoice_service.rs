//! Invoice mirroring.

use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::customer::Customer;
use crate::models::invoice::{Invoice, InvoiceUpsert};
use crate::services::amounts::{convert_amount_for_db, convert_tstamp};
use crate::services::charge_service;
use crate::store::BillingStore;
use crate::stripe::{ListParams, StripeApi};
use crate::stripe::objects::StripeInvoice;

/// Upsert an invoice from its processor object.
///
/// # Process
///
/// 1. Resolve the local customer and, when known, the subscription
/// 2. Upsert the invoice by `stripe_id`
/// 3. If the invoice was paid by a charge, re-fetch and sync that charge
///
/// # Errors
///
/// - `NotFound`: the invoice's customer is unknown locally
/// - `Stripe`: fetching the charge failed
pub async fn sync_invoice(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    object: &Value,
    stripe_account: Option<&str>,
) -> AppResult<Invoice> {
    let data: StripeInvoice = serde_json::from_value(object.clone())?;

    let customer = store
        .find_customer_by_stripe_id(&data.customer)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {}", data.customer)))?;

    let subscription_id = match data.subscription.as_deref() {
        Some(sub) => store
            .find_subscription_by_stripe_id(sub)
            .await?
            .map(|s| s.id),
        None => None,
    };

    let currency = data.currency;
    let charge = data.charge.filter(|c| !c.is_empty());

    let invoice = store
        .upsert_invoice(InvoiceUpsert {
            stripe_id: data.id,
            customer_id: customer.id,
            charge: charge.clone(),
            subscription_id,
            amount_due: convert_amount_for_db(data.amount_due, &currency),
            attempted: data.attempted,
            attempt_count: data.attempt_count,
            closed: data.closed,
            paid: data.paid,
            period_start: convert_tstamp(data.period_start),
            period_end: convert_tstamp(data.period_end),
            subtotal: convert_amount_for_db(data.subtotal, &currency),
            total: convert_amount_for_db(data.total, &currency),
            date: convert_tstamp(data.date.or(data.created)),
            currency,
        })
        .await?;

    tracing::info!(
        invoice_id = %invoice.stripe_id,
        customer_id = %customer.stripe_id,
        paid = invoice.paid,
        "Invoice synced"
    );

    if let Some(charge_id) = charge {
        charge_service::sync_charge(store, stripe, &charge_id, stripe_account).await?;
    }

    Ok(invoice)
}

/// Mirror every invoice the processor holds for `customer`, page by page.
///
/// Returns how many invoices were synced.
pub async fn sync_invoices_for_customer(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    customer: &Customer,
) -> AppResult<usize> {
    let mut synced = 0;
    let mut cursor: Option<String> = None;

    loop {
        let page = stripe
            .list_invoices(
                ListParams {
                    customer: Some(&customer.stripe_id),
                    starting_after: cursor.as_deref(),
                },
                None,
            )
            .await?;

        for object in &page.data {
            sync_invoice(store, stripe, object, None).await?;
            synced += 1;
        }

        cursor = page.next_cursor(|object| object.get("id").and_then(Value::as_str));
        if cursor.is_none() {
            break;
        }
    }

    tracing::info!(customer_id = %customer.stripe_id, synced, "Customer invoices synced");

    Ok(synced)
}
