//! Admin endpoint for mirrored charges.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::error::AppError;
use crate::models::charge::ChargeResponse;
use crate::services::charge_service;
use crate::state::AppState;

/// Fetch a mirrored charge with the amount still refundable.
pub async fn get_charge(
    State(state): State<AppState>,
    Path(stripe_id): Path<String>,
) -> Result<Json<ChargeResponse>, AppError> {
    let charge = state
        .store
        .find_charge_by_stripe_id(&stripe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Charge {stripe_id}")))?;

    let refundable = charge_service::calculate_refund_amount(&charge, None);

    Ok(Json(ChargeResponse {
        stripe_id: charge.stripe_id,
        currency: charge.currency,
        amount: charge.amount,
        amount_refunded: charge.amount_refunded,
        refundable,
        paid: charge.paid,
        refunded: charge.refunded,
        captured: charge.captured,
        disputed: charge.disputed,
        available: charge.available,
        available_on: charge.available_on,
        charge_created: charge.charge_created,
    }))
}
