//! Payment source mirroring. Only cards are kept locally.

use serde_json::Value;

use crate::error::AppResult;
use crate::models::card::{Card, CardUpsert};
use crate::models::customer::Customer;
use crate::store::BillingStore;
use crate::stripe::objects::StripeCard;

fn is_card(source: &Value) -> bool {
    match source.get("object").and_then(Value::as_str) {
        Some(object) => object == "card",
        None => source
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| id.starts_with("card_")),
    }
}

/// Upsert a payment source for `customer`.
///
/// Returns `None` for source types other than cards, which are ignored.
pub async fn sync_payment_source(
    store: &dyn BillingStore,
    customer: &Customer,
    source: &Value,
) -> AppResult<Option<Card>> {
    if !is_card(source) {
        tracing::debug!(customer_id = %customer.stripe_id, "Ignoring non-card payment source");
        return Ok(None);
    }

    let card: StripeCard = serde_json::from_value(source.clone())?;
    let stored = store
        .upsert_card(CardUpsert {
            stripe_id: card.id,
            customer_id: customer.id,
            name: card.name.unwrap_or_default(),
            brand: card.brand.unwrap_or_default(),
            country: card.country.unwrap_or_default(),
            exp_month: card.exp_month.unwrap_or_default(),
            exp_year: card.exp_year.unwrap_or_default(),
            fingerprint: card.fingerprint.unwrap_or_default(),
            funding: card.funding.unwrap_or_default(),
            last4: card.last4.unwrap_or_default(),
            cvc_check: card.cvc_check.unwrap_or_default(),
        })
        .await?;

    Ok(Some(stored))
}

/// Remove a locally mirrored card. Unknown ids are not an error.
pub async fn delete_card(store: &dyn BillingStore, stripe_id: &str) -> AppResult<()> {
    if store.delete_card(stripe_id).await? {
        tracing::info!(card_id = %stripe_id, "Card deleted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn card_detection() {
        assert!(is_card(&json!({"id": "card_1", "object": "card"})));
        assert!(is_card(&json!({"id": "card_1"})));
        assert!(!is_card(&json!({"id": "src_1", "object": "source"})));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let customer = store.get_or_create_customer("cus_1").await.unwrap();
        sync_payment_source(&store, &customer, &json!({"id": "card_1", "object": "card"}))
            .await
            .unwrap();

        delete_card(&store, "card_1").await.unwrap();
        delete_card(&store, "card_1").await.unwrap();

        assert!(store.find_card_by_stripe_id("card_1").await.unwrap().is_none());
    }
}
