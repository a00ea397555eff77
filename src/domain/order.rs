//! Order record and the loose-shaped inputs that feed it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the append-only shipping status history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: String,
    pub at: DateTime<Utc>,
}

/// Canonical payment mode, derived from the provider's raw `mode` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    OneOff,
    Subscription,
    Unknown,
}

impl PaymentMode {
    /// `payment` → one-off, `subscription` → subscription, any other
    /// non-empty string → unknown, empty → none.
    pub fn from_raw_mode(mode: &str) -> Option<Self> {
        match mode {
            "payment" => Some(Self::OneOff),
            "subscription" => Some(Self::Subscription),
            "" => None,
            _ => Some(Self::Unknown),
        }
    }
}

/// The canonical representation of one checkout attempt, paid or not.
///
/// Identity is the payment provider's checkout-session id. Field names
/// serialize in camelCase to match the persisted `orders.json` layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRecord {
    pub id: String,
    /// Human-readable `SM-YYYYMMDD-NNN` reference. Write-once.
    pub short_ref: Option<String>,
    /// First-touch timestamp. Write-once.
    pub created_at: Option<DateTime<Utc>>,

    // Customer (customerEmail/email kept as synchronized aliases)
    pub customer_email: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,

    // Payment
    pub payment_mode: Option<PaymentMode>,
    /// Raw provider mode (`payment` | `subscription`), kept alongside the
    /// canonical `payment_mode`.
    pub mode: Option<String>,
    pub payment_status: Option<String>,

    // Selections
    pub shoe_type: Option<String>,
    pub services: Vec<String>,
    pub upgrades: Vec<String>,
    pub delivery: Option<String>,

    // Totals, minor currency units
    pub amount_total: Option<i64>,
    pub currency: Option<String>,

    // Payment-provider linkage
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,

    // Shipping linkage
    pub shipping_label_id: Option<i64>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub sendcloud_status: Option<String>,
    pub sendcloud_status_updated_at: Option<DateTime<Utc>>,
    /// Append-only; entries are never mutated or removed.
    pub sendcloud_status_history: Vec<StatusHistoryEntry>,

    // Abandonment linkage
    pub checkout_url: Option<String>,
    /// 0 = never staged, else the last follow-up tier sent (1/2/3).
    pub abandoned_stage: u8,
    pub abandoned_first_at: Option<DateTime<Utc>>,
    pub abandoned_last_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    pub fn stub(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status
            .as_deref()
            .map(|s| s.to_lowercase() == "paid")
            .unwrap_or(false)
    }

    pub fn has_checkout_url(&self) -> bool {
        self.checkout_url.as_deref().map(|u| !u.is_empty()).unwrap_or(false)
    }
}

/// Partial update fed to the store's upsert path. Absent fields keep the
/// existing record's values; `shortRef` is never accepted from callers.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderUpdate {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,

    pub customer_email: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,

    pub mode: Option<String>,
    pub payment_mode: Option<PaymentMode>,
    pub payment_status: Option<String>,

    pub shoe_type: Option<String>,
    pub services: Option<StringList>,
    pub upgrades: Option<StringList>,
    pub delivery: Option<String>,

    pub amount_total: Option<i64>,
    pub currency: Option<String>,

    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,

    pub sendcloud_status: Option<Value>,

    pub checkout_url: Option<String>,
    pub abandoned_stage: Option<u8>,
    pub abandoned_first_at: Option<DateTime<Utc>>,
    pub abandoned_last_at: Option<DateTime<Utc>>,
}

impl OrderUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }
}

/// Loose list input: upstream payloads carry these as a real array, a
/// JSON-encoded array in a string, or a comma-separated string. Always
/// resolves to an ordered sequence of strings with empty entries dropped.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    Items(Vec<Value>),
    Text(String),
}

impl StringList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Items(items) => collect_strings(items),
            Self::Text(text) => {
                if let Ok(Value::Array(items)) = serde_json::from_str(&text) {
                    return collect_strings(items);
                }
                text.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }
        }
    }
}

fn collect_strings(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Coerce a shipping status to its string form: strings pass through, an
/// object's `message` field wins, anything else non-null is stringified.
pub fn coerce_status(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(msg)) => Some(msg.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}
