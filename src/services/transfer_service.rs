//! Transfer mirroring.
//!
//! Transfers are synced from the object embedded in `transfer.*` events and
//! can be refreshed on demand from the processor API.

use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::event::Event;
use crate::models::transfer::{Transfer, TransferUpsert};
use crate::services::amounts::{convert_amount_for_db, convert_optional_amount, convert_tstamp};
use crate::store::BillingStore;
use crate::stripe::StripeApi;
use crate::stripe::objects::StripeTransfer;

/// Upsert a transfer from its processor representation.
///
/// # Process
///
/// 1. Decode the transfer object
/// 2. Convert amounts to major units and timestamps to UTC
/// 3. Upsert by `stripe_id`, recording `event` as the last syncing event
///
/// A second sync of the same transfer overwrites the stored status and the
/// other mirrored fields; it never creates a second row.
///
/// # Errors
///
/// - `InvalidObject`: `object` is not a transfer
/// - `Database`: store failure
pub async fn sync_transfer(
    store: &dyn BillingStore,
    object: &Value,
    event: Option<&Event>,
) -> AppResult<Transfer> {
    let transfer: StripeTransfer = serde_json::from_value(object.clone())?;
    let upsert = transfer_upsert(transfer, event.map(|e| e.id));

    let stored = store.upsert_transfer(upsert).await?;

    tracing::info!(
        transfer_id = %stored.stripe_id,
        status = %stored.status,
        amount = %stored.amount,
        "Transfer synced"
    );

    Ok(stored)
}

fn transfer_upsert(t: StripeTransfer, event_id: Option<uuid::Uuid>) -> TransferUpsert {
    let currency = t.currency;

    TransferUpsert {
        amount: convert_amount_for_db(t.amount, &currency),
        amount_reversed: convert_optional_amount(t.amount_reversed, &currency),
        application_fee: convert_optional_amount(t.application_fee, &currency),
        created: convert_tstamp(t.created),
        date: convert_tstamp(t.date),
        stripe_id: t.id,
        currency,
        description: t.description,
        destination: t.destination,
        destination_payment: t.destination_payment,
        event_id,
        failure_code: t.failure_code,
        failure_message: t.failure_message,
        livemode: t.livemode,
        metadata: t.metadata.unwrap_or_else(|| Value::Object(Default::default())),
        method: t.method,
        reversed: t.reversed,
        source_transaction: t.source_transaction,
        source_type: t.source_type,
        statement_descriptor: t.statement_descriptor,
        // Transfers without a reported status have not left yet.
        status: t.status.unwrap_or_else(|| "pending".to_string()),
        transfer_group: t.transfer_group,
        transfer_type: t.transfer_type,
    }
}

/// Refresh a stored transfer's status from the processor API.
pub async fn update_status(
    store: &dyn BillingStore,
    stripe: &dyn StripeApi,
    transfer: &Transfer,
    stripe_account: Option<&str>,
) -> AppResult<Transfer> {
    let remote = stripe
        .retrieve_transfer(&transfer.stripe_id, stripe_account)
        .await?;

    match remote.status {
        Some(status) => store.update_transfer_status(transfer.id, &status).await,
        None => Ok(transfer.clone()),
    }
}

/// Transfers dated within `year`/`month` (1 = January).
///
/// # Errors
///
/// - `InvalidRequest`: `month` is outside 1..=12
pub async fn during(store: &dyn BillingStore, year: i32, month: u32) -> AppResult<Vec<Transfer>> {
    if !(1..=12).contains(&month) {
        return Err(AppError::InvalidRequest(format!(
            "month must be between 1 and 12, got {month}"
        )));
    }

    store.transfers_during(year, month).await
}
