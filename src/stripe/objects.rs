//! Processor API objects, as far as the local mirror needs them.
//!
//! Fields the sync functions ignore are not modelled; serde skips them.
//! Amounts are integers in the currency's minor unit and timestamps are Unix
//! seconds, exactly as the API sends them.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// A field that is either an id or the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T> Expandable<T> {
    /// The expanded object, if the API expanded it.
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(object) => Some(&**object),
        }
    }
}

/// Paginated list wrapper (`{"object": "list", "data": [...]}`).
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,

    /// More objects follow the last one in `data`
    #[serde(default)]
    pub has_more: bool,
}

impl<T> List<T> {
    /// `starting_after` for the page following this one, or `None` when this
    /// was the last page.
    pub fn next_cursor(&self, id: impl Fn(&T) -> Option<&str>) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.data.last().and_then(id).map(str::to_string)
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

/// Id of a field that may be a bare id string or an object with an `id`.
pub fn object_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeTransfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub amount_reversed: Option<i64>,
    pub application_fee: Option<i64>,
    pub created: Option<i64>,
    pub date: Option<i64>,
    pub description: Option<String>,
    pub destination: Option<String>,
    pub destination_payment: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    #[serde(default)]
    pub livemode: bool,
    pub metadata: Option<Value>,
    pub method: Option<String>,
    #[serde(default)]
    pub reversed: bool,
    pub source_transaction: Option<String>,
    pub source_type: Option<String>,
    pub statement_descriptor: Option<String>,
    pub status: Option<String>,
    pub transfer_group: Option<String>,
    #[serde(rename = "type")]
    pub transfer_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeBalanceTransaction {
    pub status: String,
    pub available_on: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub customer: Option<String>,
    pub invoice: Option<String>,
    pub source: Option<Value>,
    pub description: Option<String>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub captured: bool,
    pub dispute: Option<Value>,
    pub amount_refunded: Option<i64>,
    pub created: Option<i64>,
    pub balance_transaction: Option<Expandable<StripeBalanceTransaction>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub account_balance: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub delinquent: bool,
    pub default_source: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub sources: List<Value>,
    #[serde(default)]
    pub subscriptions: List<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCard {
    pub id: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub country: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub fingerprint: Option<String>,
    pub funding: Option<String>,
    pub last4: Option<String>,
    pub cvc_check: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub plan: Option<Value>,
    pub quantity: Option<i32>,
    pub status: String,
    pub start: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<i64>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub ended_at: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    pub application_fee_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: String,
    pub amount_due: i64,
    #[serde(default)]
    pub attempted: bool,
    pub attempt_count: Option<i32>,
    pub charge: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub paid: bool,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    #[serde(default)]
    pub subtotal: i64,
    #[serde(default)]
    pub total: i64,
    pub date: Option<i64>,
    pub created: Option<i64>,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeAccount {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balance_transaction_id_or_object() {
        let bare: StripeCharge = serde_json::from_value(json!({
            "id": "ch_1", "amount": 500, "currency": "usd",
            "balance_transaction": "txn_1"
        }))
        .unwrap();
        assert!(bare.balance_transaction.unwrap().as_object().is_none());

        let expanded: StripeCharge = serde_json::from_value(json!({
            "id": "ch_1", "amount": 500, "currency": "usd",
            "balance_transaction": {"status": "available", "available_on": 1364601600}
        }))
        .unwrap();
        let txn = expanded.balance_transaction.unwrap();
        assert_eq!(txn.as_object().unwrap().status, "available");
    }

    #[test]
    fn object_id_accepts_string_or_object() {
        assert_eq!(object_id(&json!("card_1")).as_deref(), Some("card_1"));
        assert_eq!(object_id(&json!({"id": "card_2"})).as_deref(), Some("card_2"));
        assert_eq!(object_id(&json!(null)), None);
    }

    #[test]
    fn customer_lists_default_to_empty() {
        let customer: StripeCustomer = serde_json::from_value(json!({"id": "cus_1"})).unwrap();
        assert!(customer.sources.data.is_empty());
        assert!(customer.subscriptions.data.is_empty());
        assert!(!customer.deleted);
    }
}
