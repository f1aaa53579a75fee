//! Subscription mirroring for a known customer.

use serde_json::Value;

use crate::error::AppResult;
use crate::models::customer::Customer;
use crate::models::subscription::{Subscription, SubscriptionUpsert};
use crate::services::amounts::convert_tstamp;
use crate::store::BillingStore;
use crate::stripe::objects::{StripeSubscription, object_id};

/// Upsert a subscription belonging to `customer` from its processor object.
pub async fn sync_subscription(
    store: &dyn BillingStore,
    customer: &Customer,
    object: &Value,
) -> AppResult<Subscription> {
    let sub: StripeSubscription = serde_json::from_value(object.clone())?;

    let stored = store
        .upsert_subscription(SubscriptionUpsert {
            stripe_id: sub.id,
            customer_id: customer.id,
            plan: sub.plan.as_ref().and_then(object_id),
            quantity: sub.quantity.unwrap_or(1),
            status: sub.status,
            start: convert_tstamp(sub.start),
            cancel_at_period_end: sub.cancel_at_period_end,
            canceled_at: convert_tstamp(sub.canceled_at),
            current_period_start: convert_tstamp(sub.current_period_start),
            current_period_end: convert_tstamp(sub.current_period_end),
            ended_at: convert_tstamp(sub.ended_at),
            trial_start: convert_tstamp(sub.trial_start),
            trial_end: convert_tstamp(sub.trial_end),
            application_fee_percent: sub.application_fee_percent,
        })
        .await?;

    tracing::info!(
        subscription_id = %stored.stripe_id,
        customer_id = %customer.stripe_id,
        status = %stored.status,
        "Subscription synced"
    );

    Ok(stored)
}
