//! Charge mirroring and refund arithmetic.

use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::models::charge::{Charge, ChargeUpsert};
use crate::models::customer::Customer;
use crate::services::amounts::{convert_amount_for_db, convert_optional_amount, convert_tstamp};
use crate::store::BillingStore;
use crate::stripe::{ListParams, StripeApi};
use crate::stripe::objects::{StripeCharge, object_id};

/// Re-fetch a charge (balance transaction expanded) and mirror it.
pub async fn sync_charge(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    charge_id: &str,
    stripe_account: Option<&str>,
) -> AppResult<Charge> {
    let data = stripe.retrieve_charge(charge_id, stripe_account).await?;
    sync_charge_from_stripe_data(store, &data).await
}

/// Mirror a charge object returned by the processor API.
///
/// # Rules
///
/// - The charge's customer must already exist locally
/// - A fully refunded charge records its whole amount as refunded
/// - `available` / `available_on` are only written when the balance
///   transaction was expanded
/// - An empty description never overwrites a stored one
///
/// # Errors
///
/// - `NotFound`: the charge has no customer, or the customer is unknown
/// - `Database`: store failure
pub async fn sync_charge_from_stripe_data(
    store: &dyn BillingStore,
    data: &StripeCharge,
) -> AppResult<Charge> {
    let customer_id = data
        .customer
        .as_deref()
        .ok_or_else(|| AppError::NotFound(format!("Customer for charge {}", data.id)))?;
    let customer = store
        .find_customer_by_stripe_id(customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {customer_id}")))?;

    let invoice_id = match data.invoice.as_deref() {
        Some(invoice) => store.find_invoice_by_stripe_id(invoice).await?.map(|i| i.id),
        None => None,
    };

    let amount = convert_amount_for_db(data.amount, &data.currency);
    let amount_refunded = if data.refunded {
        Some(amount)
    } else {
        convert_optional_amount(data.amount_refunded, &data.currency)
    };

    let balance = data
        .balance_transaction
        .as_ref()
        .and_then(|txn| txn.as_object());

    let upsert = ChargeUpsert {
        stripe_id: data.id.clone(),
        customer_id: customer.id,
        invoice_id,
        source: data.source.as_ref().and_then(object_id).unwrap_or_default(),
        currency: data.currency.clone(),
        amount,
        amount_refunded,
        description: data.description.clone().filter(|d| !d.is_empty()),
        paid: data.paid,
        disputed: data.dispute.is_some(),
        refunded: data.refunded,
        captured: data.captured,
        available: balance.map(|txn| txn.status == "available"),
        available_on: balance.and_then(|txn| convert_tstamp(txn.available_on)),
        charge_created: convert_tstamp(data.created),
    };

    let charge = store.upsert_charge(upsert).await?;

    tracing::info!(
        charge_id = %charge.stripe_id,
        customer_id = %customer.stripe_id,
        paid = charge.paid,
        refunded = charge.refunded,
        "Charge synced"
    );

    Ok(charge)
}

/// Mirror every charge the processor holds for `customer`, page by page.
///
/// Returns how many charges were synced.
pub async fn sync_charges_for_customer(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    customer: &Customer,
) -> AppResult<usize> {
    let mut synced = 0;
    let mut cursor: Option<String> = None;

    loop {
        let page = stripe
            .list_charges(
                ListParams {
                    customer: Some(&customer.stripe_id),
                    starting_after: cursor.as_deref(),
                },
                None,
            )
            .await?;

        for data in &page.data {
            sync_charge_from_stripe_data(store, data).await?;
            synced += 1;
        }

        cursor = page.next_cursor(|charge| Some(charge.id.as_str()));
        if cursor.is_none() {
            break;
        }
    }

    tracing::info!(customer_id = %customer.stripe_id, synced, "Customer charges synced");

    Ok(synced)
}

/// Re-fetch every charge whose funds may still become available.
///
/// Charges that are already both available and refunded cannot change and
/// are skipped. Returns how many charges were re-fetched.
pub async fn update_charge_availability(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
) -> AppResult<usize> {
    let pending = store.charges_awaiting_availability().await?;

    for charge in &pending {
        sync_charge(store, stripe, &charge.stripe_id, None).await?;
    }

    tracing::info!(checked = pending.len(), "Charge availability updated");

    Ok(pending.len())
}

/// Amount of `charge` that can still be refunded, capped at `amount` when
/// one is requested.
pub fn calculate_refund_amount(charge: &Charge, amount: Option<Decimal>) -> Decimal {
    let eligible = charge.amount - charge.amount_refunded.unwrap_or_default();
    match amount {
        Some(requested) if !requested.is_zero() => eligible.min(requested),
        _ => eligible,
    }
}
