//! Invoice mirror model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Represents an invoice record from the database.
///
/// Maps to the `invoices` table, unique by `stripe_id`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub stripe_id: String,
    pub customer_id: Uuid,

    /// Processor id of the charge that paid this invoice
    pub charge: Option<String>,

    pub subscription_id: Option<Uuid>,
    pub amount_due: Decimal,
    pub attempted: bool,
    pub attempt_count: Option<i32>,
    pub closed: bool,
    pub paid: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub date: Option<DateTime<Utc>>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload for [`Invoice`], keyed by `stripe_id`.
#[derive(Debug, Clone)]
pub struct InvoiceUpsert {
    pub stripe_id: String,
    pub customer_id: Uuid,
    pub charge: Option<String>,
    pub subscription_id: Option<Uuid>,
    pub amount_due: Decimal,
    pub attempted: bool,
    pub attempt_count: Option<i32>,
    pub closed: bool,
    pub paid: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub date: Option<DateTime<Utc>>,
    pub currency: String,
}
