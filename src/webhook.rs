//! Payment-provider webhook intake
//!
//! Signature verification (`t=..,v1=..` header, HMAC-SHA256 over
//! `timestamp.payload`, 5-minute replay tolerance) and the
//! `checkout.session.completed` payload shapes the handler consumes.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the signed timestamp and now, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a signature header of the form `t=<unix>,v1=<hex hmac>`.
/// Returns false (never an error) for malformed headers, stale
/// timestamps or digest mismatches.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else { return false };
    if signatures.is_empty() {
        return false;
    }

    let Ok(ts) = timestamp.parse::<i64>() else { return false };
    if (Utc::now().timestamp() - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    signatures.into_iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    })
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: CheckoutSession,
}

/// The slice of the provider's checkout session the core cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutSession {
    pub id: String,
    pub mode: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub url: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl CheckoutSession {
    pub fn email(&self) -> Option<String> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.clone())
            .or_else(|| self.customer_email.clone())
    }

    pub fn name(&self) -> Option<String> {
        self.customer_details.as_ref().and_then(|d| d.name.clone())
    }

    pub fn phone(&self) -> Option<String> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.phone.clone())
            .or_else(|| self.meta("phone"))
    }

    pub fn meta(&self, key: &str) -> Option<String> {
        self.metadata.get(key).cloned().filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, String::from_utf8_lossy(payload)).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn current_timestamp() -> String {
        Utc::now().timestamp().to_string()
    }

    #[test]
    fn valid_signature_accepted() {
        let payload = b"{\"type\":\"checkout.session.completed\"}";
        let ts = current_timestamp();
        let header = format!("t={},v1={}", ts, sign(payload, SECRET, &ts));
        assert!(verify_signature(payload, &header, SECRET));
    }

    #[test]
    fn wrong_secret_rejected() {
        let payload = b"{\"type\":\"checkout.session.completed\"}";
        let ts = current_timestamp();
        let header = format!("t={},v1={}", ts, sign(payload, "wrong_secret", &ts));
        assert!(!verify_signature(payload, &header, SECRET));
    }

    #[test]
    fn modified_payload_rejected() {
        let payload = b"{\"type\":\"checkout.session.completed\"}";
        let tampered = b"{\"type\":\"checkout.session.completed\",\"x\":1}";
        let ts = current_timestamp();
        let header = format!("t={},v1={}", ts, sign(payload, SECRET, &ts));
        assert!(!verify_signature(tampered, &header, SECRET));
    }

    #[test]
    fn stale_timestamp_rejected() {
        let payload = b"{}";
        let ts = (Utc::now().timestamp() - 600).to_string();
        let header = format!("t={},v1={}", ts, sign(payload, SECRET, &ts));
        assert!(!verify_signature(payload, &header, SECRET));
    }

    #[test]
    fn malformed_header_rejected() {
        assert!(!verify_signature(b"{}", "", SECRET));
        assert!(!verify_signature(b"{}", "v1=abc", SECRET));
        assert!(!verify_signature(b"{}", "t=notanumber,v1=abc", SECRET));
    }

    #[test]
    fn session_parses_from_provider_shape() {
        let raw = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "mode": "payment",
                "payment_status": "paid",
                "amount_total": 4300,
                "currency": "gbp",
                "customer": "cus_1",
                "url": null,
                "customer_details": {"email": "a@b.com", "name": "Sam", "phone": "+44 1"},
                "metadata": {
                    "shoeType": "trainers",
                    "services": "[\"deep_clean\"]",
                    "delivery": "postal",
                    "addressLine1": "1 High St",
                    "city": "London",
                    "postcode": "N1 1AA"
                }
            }}
        });
        let event: WebhookEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.kind, "checkout.session.completed");
        let session = event.data.object;
        assert_eq!(session.email().as_deref(), Some("a@b.com"));
        assert_eq!(session.meta("shoeType").as_deref(), Some("trainers"));
        assert_eq!(session.meta("missing"), None);
    }
}
