//! Admin endpoints that rebuild the mirror from the processor's lists.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::services::charge_service;
use crate::services::resync_service::{self, ResyncReport};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Charges re-fetched because their funds could still become available
    pub charges_checked: usize,
}

#[derive(Debug, Serialize)]
pub struct CustomerResyncResponse {
    pub stripe_id: String,
    pub purged: bool,
    pub invoices_synced: usize,
    pub charges_synced: usize,
}

/// Resync every customer, charge and invoice on the platform account.
///
/// # Request
///
/// ```text
/// POST /api/v1/resync
/// ```
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "customers_synced": 120,
///   "customers_created": 3,
///   "customers_skipped": 0,
///   "charges_synced": 418,
///   "charges_skipped": 2,
///   "invoices_synced": 377,
///   "invoices_skipped": 1
/// }
/// ```
pub async fn resync_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ResyncReport>, AppError> {
    tracing::info!(requested_by = %auth.owner_name, "Full resync started");

    let report = resync_service::resync_all(state.store.as_ref(), state.stripe.as_ref()).await?;

    Ok(Json(report))
}

/// Re-fetch paid, captured charges whose availability can still change.
pub async fn update_charge_availability(
    State(state): State<AppState>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let charges_checked =
        charge_service::update_charge_availability(state.store.as_ref(), state.stripe.as_ref())
            .await?;

    Ok(Json(AvailabilityResponse { charges_checked }))
}

/// Resync one mirrored customer with its invoices and charges.
///
/// # Errors
///
/// - `NotFound`: the customer is not mirrored locally
/// - `Stripe`: the processor request failed
pub async fn resync_customer(
    State(state): State<AppState>,
    Path(stripe_id): Path<String>,
) -> Result<Json<CustomerResyncResponse>, AppError> {
    let customer = state
        .store
        .find_customer_by_stripe_id(&stripe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {stripe_id}")))?;

    let result =
        resync_service::resync_customer(state.store.as_ref(), state.stripe.as_ref(), &customer)
            .await?;

    Ok(Json(CustomerResyncResponse {
        stripe_id: result.customer.stripe_id,
        purged: result.customer.date_purged.is_some(),
        invoices_synced: result.invoices_synced,
        charges_synced: result.charges_synced,
    }))
}
