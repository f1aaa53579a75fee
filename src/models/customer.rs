//! Customer mirror model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Represents a customer record from the database.
///
/// # Database Table
///
/// Maps to the `customers` table, unique by `stripe_id`. A purged customer
/// (deleted on the processor side) keeps its row with `date_purged` set and
/// is skipped by later syncs.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Customer {
    pub id: Uuid,
    pub stripe_id: String,

    /// Balance in major units of `currency`
    pub account_balance: Option<Decimal>,

    pub currency: String,
    pub delinquent: bool,
    pub default_source: String,
    pub date_purged: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields written by a customer sync.
#[derive(Debug, Clone)]
pub struct CustomerUpdate {
    pub account_balance: Option<Decimal>,
    pub currency: String,
    pub delinquent: bool,
    pub default_source: String,
}
