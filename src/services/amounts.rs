//! Conversions between processor wire values and stored values.
//!
//! The processor sends amounts as integers in the currency's minor unit
//! (cents for USD) and timestamps as Unix seconds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Currencies without a minor unit. Amounts in these are stored as sent.
const ZERO_DECIMAL_CURRENCIES: [&str; 15] = [
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "vnd", "vuv", "xaf",
    "xof", "xpf",
];

fn is_zero_decimal(currency: &str) -> bool {
    ZERO_DECIMAL_CURRENCIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(currency))
}

/// Convert a minor-unit amount to the major-unit decimal stored locally.
///
/// # Examples
///
/// ```
/// use billing_sync::services::amounts::convert_amount_for_db;
/// use rust_decimal::Decimal;
///
/// assert_eq!(convert_amount_for_db(455, "usd"), Decimal::new(455, 2));
/// assert_eq!(convert_amount_for_db(455, "JPY"), Decimal::from(455));
/// ```
pub fn convert_amount_for_db(amount: i64, currency: &str) -> Decimal {
    if is_zero_decimal(currency) {
        Decimal::from(amount)
    } else {
        Decimal::new(amount, 2)
    }
}

/// Like [`convert_amount_for_db`], treating a missing or zero amount as
/// absent.
pub fn convert_optional_amount(amount: Option<i64>, currency: &str) -> Option<Decimal> {
    amount
        .filter(|a| *a != 0)
        .map(|a| convert_amount_for_db(a, currency))
}

/// Convert a Unix timestamp in seconds to a UTC datetime.
///
/// Missing and out-of-range values become `None`.
pub fn convert_tstamp(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}
