use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Card payment source attached to a customer.
///
/// Maps to the `cards` table, unique by `stripe_id`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Card {
    pub id: Uuid,
    pub stripe_id: String,
    pub customer_id: Uuid,
    pub name: String,
    pub brand: String,
    pub country: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub fingerprint: String,
    pub funding: String,
    pub last4: String,
    pub cvc_check: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CardUpsert {
    pub stripe_id: String,
    pub customer_id: Uuid,
    pub name: String,
    pub brand: String,
    pub country: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub fingerprint: String,
    pub funding: String,
    pub last4: String,
    pub cvc_check: String,
}
