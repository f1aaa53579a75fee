//! Admin endpoints for mirrored transfers.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::transfer::TransferResponse;
use crate::services::transfer_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransfersDuringQuery {
    pub year: i32,

    /// 1 = January
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    /// Connected account the transfer belongs to
    pub stripe_account: Option<String>,
}

/// List transfers dated within a calendar month.
///
/// # Request
///
/// ```text
/// GET /api/v1/transfers?year=2013&month=3
/// ```
pub async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<TransfersDuringQuery>,
) -> Result<Json<Vec<TransferResponse>>, AppError> {
    let transfers = transfer_service::during(state.store.as_ref(), query.year, query.month).await?;

    Ok(Json(
        transfers.into_iter().map(TransferResponse::from).collect(),
    ))
}

/// Re-fetch a transfer's status from the processor.
///
/// # Errors
///
/// - `NotFound`: the transfer is not mirrored locally
/// - `Stripe`: the processor request failed
pub async fn refresh_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(stripe_id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<TransferResponse>, AppError> {
    let transfer = state
        .store
        .find_transfer_by_stripe_id(&stripe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transfer {stripe_id}")))?;

    let refreshed = transfer_service::update_status(
        state.store.as_ref(),
        state.stripe.as_ref(),
        &transfer,
        query.stripe_account.as_deref(),
    )
    .await?;

    tracing::info!(
        transfer_id = %refreshed.stripe_id,
        status = %refreshed.status,
        requested_by = %auth.owner_name,
        "Transfer status refreshed"
    );

    Ok(Json(TransferResponse::from(refreshed)))
}
