//! Connected account model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A connected account known to this platform.
///
/// # Database Table
///
/// Maps to the `accounts` table, unique by `stripe_id`. Events sent on behalf
/// of a connected account carry its id in `Event::stripe_account`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,

    /// Processor account id (`acct_...`)
    pub stripe_id: String,

    pub created_at: DateTime<Utc>,
}
