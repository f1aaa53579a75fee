//! Transfer mirror model and admin API response type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Represents a transfer record from the database.
///
/// # Database Table
///
/// Maps to the `transfers` table, unique by `stripe_id`. Rows are upserted by
/// every `transfer.*` event; the latest event wins for `status` and the other
/// mirrored fields.
///
/// # Amount Storage
///
/// Amounts are stored in major units (`455` cents arrive as `4.55`), except
/// for zero-decimal currencies which are stored as sent.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transfer {
    pub id: Uuid,
    pub stripe_id: String,
    pub amount: Decimal,
    pub amount_reversed: Option<Decimal>,
    pub application_fee: Option<Decimal>,
    pub created: Option<DateTime<Utc>>,
    pub currency: String,

    /// Date the transfer is expected to arrive
    pub date: Option<DateTime<Utc>>,

    pub description: Option<String>,
    pub destination: Option<String>,
    pub destination_payment: Option<String>,

    /// Event that last synced this transfer
    pub event_id: Option<Uuid>,

    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub livemode: bool,
    pub metadata: Value,
    pub method: Option<String>,
    pub reversed: bool,
    pub source_transaction: Option<String>,
    pub source_type: Option<String>,
    pub statement_descriptor: Option<String>,

    /// `pending`, `paid`, `failed`, `canceled` or `in_transit`
    pub status: String,

    pub transfer_group: Option<String>,
    pub transfer_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload for [`Transfer`], keyed by `stripe_id`.
#[derive(Debug, Clone)]
pub struct TransferUpsert {
    pub stripe_id: String,
    pub amount: Decimal,
    pub amount_reversed: Option<Decimal>,
    pub application_fee: Option<Decimal>,
    pub created: Option<DateTime<Utc>>,
    pub currency: String,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub destination: Option<String>,
    pub destination_payment: Option<String>,
    pub event_id: Option<Uuid>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub livemode: bool,
    pub metadata: Value,
    pub method: Option<String>,
    pub reversed: bool,
    pub source_transaction: Option<String>,
    pub source_type: Option<String>,
    pub statement_descriptor: Option<String>,
    pub status: String,
    pub transfer_group: Option<String>,
    pub transfer_type: Option<String>,
}

/// Response body for transfer endpoints.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub stripe_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub destination: Option<String>,
    pub status: String,
    pub reversed: bool,
    pub livemode: bool,
}

impl From<Transfer> for TransferResponse {
    fn from(transfer: Transfer) -> Self {
        Self {
            stripe_id: transfer.stripe_id,
            amount: transfer.amount,
            currency: transfer.currency,
            date: transfer.date,
            description: transfer.description,
            destination: transfer.destination,
            status: transfer.status,
            reversed: transfer.reversed,
            livemode: transfer.livemode,
        }
    }
}
