//! Shipping status overlay + append-only history tracking

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::order::{coerce_status, OrderRecord, StatusHistoryEntry};

/// Incoming shipping-provider state for one parcel poll or creation.
/// `status` keeps the provider's raw shape (string or `{id, message}`).
#[derive(Clone, Debug, Default)]
pub struct ShippingUpdate {
    pub parcel_id: Option<i64>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub status: Option<Value>,
}

/// Overlay the shipping fields onto `existing`, appending a history entry
/// only when the coerced status actually changed. An unchanged status with
/// no recorded `sendcloudStatusUpdatedAt` backfills the timestamp once,
/// without a duplicate history entry.
pub fn apply_status_update(
    existing: &OrderRecord,
    incoming: &ShippingUpdate,
    now: DateTime<Utc>,
) -> OrderRecord {
    let status_str = incoming.status.as_ref().and_then(coerce_status);

    let prev_status = existing.sendcloud_status.clone().unwrap_or_default();
    let new_status = status_str.clone().unwrap_or_default();

    let mut next = existing.clone();
    next.shipping_label_id = incoming.parcel_id.or(existing.shipping_label_id);
    next.tracking_number = incoming.tracking_number.clone().or_else(|| existing.tracking_number.clone());
    next.tracking_url = incoming.tracking_url.clone().or_else(|| existing.tracking_url.clone());
    next.sendcloud_status = status_str.or_else(|| existing.sendcloud_status.clone());

    if !new_status.is_empty() && new_status != prev_status {
        next.sendcloud_status_history.push(StatusHistoryEntry { status: new_status, at: now });
        next.sendcloud_status_updated_at = Some(now);
    } else if existing.sendcloud_status_updated_at.is_none()
        && (!prev_status.is_empty() || !new_status.is_empty())
    {
        next.sendcloud_status_updated_at = Some(now);
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2026-08-30T12:00:00Z".parse().unwrap()
    }

    fn later() -> DateTime<Utc> {
        "2026-08-30T13:00:00Z".parse().unwrap()
    }

    fn update(status: Value) -> ShippingUpdate {
        ShippingUpdate {
            parcel_id: Some(42),
            tracking_number: Some("TRK1".into()),
            tracking_url: Some("https://track/TRK1".into()),
            status: Some(status),
        }
    }

    #[test]
    fn status_change_appends_history() {
        let order = OrderRecord::stub("cs_1");
        let next = apply_status_update(&order, &update(json!("Ready to send")), now());
        assert_eq!(next.shipping_label_id, Some(42));
        assert_eq!(next.sendcloud_status.as_deref(), Some("Ready to send"));
        assert_eq!(next.sendcloud_status_updated_at, Some(now()));
        assert_eq!(next.sendcloud_status_history.len(), 1);
        assert_eq!(next.sendcloud_status_history[0].status, "Ready to send");
    }

    #[test]
    fn repeated_status_does_not_duplicate() {
        let order = OrderRecord::stub("cs_1");
        let first = apply_status_update(&order, &update(json!("Ready to send")), now());
        let second = apply_status_update(&first, &update(json!("Ready to send")), later());
        assert_eq!(second.sendcloud_status_history.len(), 1);
        // timestamp stays at the first sighting
        assert_eq!(second.sendcloud_status_updated_at, Some(now()));
    }

    #[test]
    fn history_grows_on_each_distinct_status() {
        let order = OrderRecord::stub("cs_1");
        let first = apply_status_update(&order, &update(json!("Ready to send")), now());
        let second = apply_status_update(&first, &update(json!({"id": 5, "message": "En route"})), later());
        let statuses: Vec<_> = second.sendcloud_status_history.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["Ready to send", "En route"]);
        assert_eq!(second.sendcloud_status_updated_at, Some(later()));
    }

    #[test]
    fn backfills_updated_at_once_when_status_already_known() {
        // Legacy record: status present but no timestamp ever recorded.
        let order = OrderRecord {
            sendcloud_status: Some("Ready to send".into()),
            ..OrderRecord::stub("cs_1")
        };
        let next = apply_status_update(&order, &update(json!("Ready to send")), now());
        assert_eq!(next.sendcloud_status_updated_at, Some(now()));
        assert!(next.sendcloud_status_history.is_empty());
    }

    #[test]
    fn null_fields_fall_back_to_existing() {
        let order = OrderRecord {
            shipping_label_id: Some(7),
            tracking_number: Some("OLD".into()),
            sendcloud_status: Some("Ready to send".into()),
            sendcloud_status_updated_at: Some(now()),
            ..OrderRecord::stub("cs_1")
        };
        let next = apply_status_update(&order, &ShippingUpdate::default(), later());
        assert_eq!(next.shipping_label_id, Some(7));
        assert_eq!(next.tracking_number.as_deref(), Some("OLD"));
        assert_eq!(next.sendcloud_status.as_deref(), Some("Ready to send"));
        assert!(next.sendcloud_status_history.is_empty());
    }
}
