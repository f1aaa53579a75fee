use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Represents a subscription record from the database.
///
/// Maps to the `subscriptions` table, unique by `stripe_id`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub stripe_id: String,
    pub customer_id: Uuid,

    /// Processor plan id
    pub plan: Option<String>,

    pub quantity: i32,
    pub status: String,
    pub start: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub application_fee_percent: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub stripe_id: String,
    pub customer_id: Uuid,
    pub plan: Option<String>,
    pub quantity: i32,
    pub status: String,
    pub start: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub application_fee_percent: Option<Decimal>,
}
