//! Customer mirroring and event-to-customer linking.

use serde_json::Value;

use crate::error::AppResult;
use crate::models::customer::{Customer, CustomerUpdate};
use crate::models::event::Event;
use crate::services::amounts::convert_amount_for_db;
use crate::services::{source_service, subscription_service};
use crate::store::BillingStore;
use crate::stripe::StripeApi;
use crate::stripe::objects::StripeCustomer;

/// Kinds whose `data.object` is the customer itself.
const CUSTOMER_CRUD_KINDS: [&str; 3] = ["customer.created", "customer.updated", "customer.deleted"];

/// Processor id of the customer an event concerns, if any.
///
/// For customer create/update/delete events this is the object's own `id`;
/// for every other kind it is the object's `customer` field.
pub fn customer_stripe_id(event: &Event) -> Option<&str> {
    let object = event.data_object();
    let field = if CUSTOMER_CRUD_KINDS.contains(&event.kind.as_str()) {
        "id"
    } else {
        "customer"
    };
    object.get(field).and_then(Value::as_str)
}

/// Attach the event to its local customer, creating the customer row when
/// this is the first time the processor id is seen.
///
/// The caller persists the event.
pub async fn link_customer(store: &dyn BillingStore, event: &mut Event) -> AppResult<()> {
    let Some(stripe_id) = customer_stripe_id(event) else {
        return Ok(());
    };

    let customer = store.get_or_create_customer(stripe_id).await?;
    event.customer_id = Some(customer.id);

    tracing::debug!(
        event_id = %event.stripe_id,
        customer_id = %customer.stripe_id,
        "Event linked to customer"
    );

    Ok(())
}

/// Bring a local customer in line with the processor.
///
/// # Process
///
/// 1. Purged customers are left untouched
/// 2. Without `object`, the customer is fetched from the processor API
/// 3. A deleted customer is purged
/// 4. Otherwise balance, currency, delinquency and default source are
///    updated, then embedded payment sources and subscriptions are synced
///
/// Returns the customer as stored afterwards.
pub async fn sync_customer(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    customer: &Customer,
    object: Option<StripeCustomer>,
    stripe_account: Option<&str>,
) -> AppResult<Customer> {
    if customer.date_purged.is_some() {
        tracing::debug!(customer_id = %customer.stripe_id, "Skipping purged customer");
        return Ok(customer.clone());
    }

    let data = match object {
        Some(data) => data,
        None => {
            stripe
                .retrieve_customer(&customer.stripe_id, stripe_account)
                .await?
        }
    };

    if data.deleted {
        return purge_customer(store, customer).await;
    }

    let currency = data.currency.unwrap_or_default();
    let update = CustomerUpdate {
        account_balance: data
            .account_balance
            .map(|balance| convert_amount_for_db(balance, &currency)),
        currency,
        delinquent: data.delinquent,
        default_source: data.default_source.unwrap_or_default(),
    };
    let updated = store.update_customer(customer.id, update).await?;

    for source in &data.sources.data {
        source_service::sync_payment_source(store, &updated, source).await?;
    }
    for subscription in &data.subscriptions.data {
        subscription_service::sync_subscription(store, &updated, subscription).await?;
    }

    tracing::info!(customer_id = %updated.stripe_id, "Customer synced");

    Ok(updated)
}

/// Mark a customer purged; later syncs skip it.
pub async fn purge_customer(store: &dyn BillingStore, customer: &Customer) -> AppResult<Customer> {
    store.purge_customer(customer.id).await?;

    tracing::info!(customer_id = %customer.stripe_id, "Customer purged");

    Ok(store
        .find_customer(customer.id)
        .await?
        .unwrap_or_else(|| customer.clone()))
}
