//! Charge mirror model and admin API response type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Represents a charge record from the database.
///
/// # Database Table
///
/// Maps to the `charges` table, unique by `stripe_id`. Every charge belongs
/// to a local customer; syncing a charge whose customer is unknown fails.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Charge {
    pub id: Uuid,
    pub stripe_id: String,
    pub customer_id: Uuid,
    pub invoice_id: Option<Uuid>,

    /// Id of the payment source charged
    pub source: String,

    pub currency: String,
    pub amount: Decimal,
    pub amount_refunded: Option<Decimal>,
    pub description: String,
    pub paid: bool,
    pub disputed: bool,
    pub refunded: bool,
    pub captured: bool,

    /// Whether the funds have reached the available balance
    pub available: bool,

    pub available_on: Option<DateTime<Utc>>,
    pub charge_created: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload for [`Charge`], keyed by `stripe_id`.
///
/// `available` and `available_on` are `None` when the processor did not
/// expand the balance transaction; the stored values are then kept.
#[derive(Debug, Clone)]
pub struct ChargeUpsert {
    pub stripe_id: String,
    pub customer_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub source: String,
    pub currency: String,
    pub amount: Decimal,
    pub amount_refunded: Option<Decimal>,
    pub description: Option<String>,
    pub paid: bool,
    pub disputed: bool,
    pub refunded: bool,
    pub captured: bool,
    pub available: Option<bool>,
    pub available_on: Option<DateTime<Utc>>,
    pub charge_created: Option<DateTime<Utc>>,
}

/// Response body for `GET /api/v1/charges/{stripe_id}`.
#[derive(Debug, Serialize)]
pub struct ChargeResponse {
    pub stripe_id: String,
    pub currency: String,
    pub amount: Decimal,
    pub amount_refunded: Option<Decimal>,

    /// Amount that can still be refunded
    pub refundable: Decimal,

    pub paid: bool,
    pub refunded: bool,
    pub captured: bool,
    pub disputed: bool,
    pub available: bool,
    pub available_on: Option<DateTime<Utc>>,
    pub charge_created: Option<DateTime<Utc>>,
}
