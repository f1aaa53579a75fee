//! Connected account mirroring.

use serde_json::Value;

use crate::error::AppResult;
use crate::models::account::Account;
use crate::store::BillingStore;
use crate::stripe::objects::StripeAccount;

/// Get or create the local row for a connected account object.
pub async fn sync_account(store: &dyn BillingStore, object: &Value) -> AppResult<Account> {
    let data: StripeAccount = serde_json::from_value(object.clone())?;
    let account = store.get_or_create_account(&data.id).await?;

    tracing::info!(account_id = %account.stripe_id, "Account synced");

    Ok(account)
}
