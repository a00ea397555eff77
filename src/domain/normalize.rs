//! Merge + canonicalisation of order records
//!
//! Every write funnels through here. `merge_update` overlays a partial
//! update on the existing record (last-writer-wins per field), then
//! `normalize_record` enforces the canonical-field rules: write-once
//! `createdAt`/`shortRef`, email alias sync, `paymentMode` derivation,
//! array/status coercion and delivery casing. Normalisation is idempotent.

use chrono::{DateTime, Utc};

use super::order::{coerce_status, OrderRecord, OrderUpdate, PaymentMode};
use super::reference;

/// Overlay `update` onto `existing` (or a fresh stub) and canonicalise.
/// `all` is the full current collection, needed for reference generation.
pub fn merge_update(
    update: OrderUpdate,
    existing: Option<&OrderRecord>,
    all: &[OrderRecord],
    now: DateTime<Utc>,
) -> OrderRecord {
    let mut rec = existing.cloned().unwrap_or_else(|| OrderRecord::stub(update.id.clone()));

    // createdAt is write-once: an existing value survives any update.
    if rec.created_at.is_none() {
        rec.created_at = update.created_at;
    }

    if update.customer_email.is_some() {
        rec.customer_email = update.customer_email;
    }
    if update.email.is_some() {
        rec.email = update.email;
    }
    if update.name.is_some() {
        rec.name = update.name;
    }
    if update.phone.is_some() {
        rec.phone = update.phone;
    }
    if update.mode.is_some() {
        rec.mode = update.mode;
    }
    if update.payment_mode.is_some() {
        rec.payment_mode = update.payment_mode;
    }
    if update.payment_status.is_some() {
        rec.payment_status = update.payment_status;
    }
    if update.shoe_type.is_some() {
        rec.shoe_type = update.shoe_type;
    }
    if let Some(services) = update.services {
        rec.services = services.into_vec();
    }
    if let Some(upgrades) = update.upgrades {
        rec.upgrades = upgrades.into_vec();
    }
    if update.delivery.is_some() {
        rec.delivery = update.delivery;
    }
    if update.amount_total.is_some() {
        rec.amount_total = update.amount_total;
    }
    if update.currency.is_some() {
        rec.currency = update.currency;
    }
    if update.stripe_customer_id.is_some() {
        rec.stripe_customer_id = update.stripe_customer_id;
    }
    if update.stripe_subscription_id.is_some() {
        rec.stripe_subscription_id = update.stripe_subscription_id;
    }
    if let Some(status) = update.sendcloud_status {
        rec.sendcloud_status = coerce_status(&status);
    }
    if update.checkout_url.is_some() {
        rec.checkout_url = update.checkout_url;
    }
    if let Some(stage) = update.abandoned_stage {
        rec.abandoned_stage = stage;
    }
    if update.abandoned_first_at.is_some() {
        rec.abandoned_first_at = update.abandoned_first_at;
    }
    if update.abandoned_last_at.is_some() {
        rec.abandoned_last_at = update.abandoned_last_at;
    }

    normalize_record(rec, existing, all, now)
}

/// Canonical-field derivation on a full record. Safe to apply repeatedly:
/// a record that has already been normalized comes back unchanged.
pub fn normalize_record(
    mut rec: OrderRecord,
    existing: Option<&OrderRecord>,
    all: &[OrderRecord],
    now: DateTime<Utc>,
) -> OrderRecord {
    // createdAt only set once
    if rec.created_at.is_none() {
        rec.created_at = existing.and_then(|e| e.created_at).or(Some(now));
    }

    // shortRef only set once
    if rec.short_ref.is_none() {
        rec.short_ref = existing
            .and_then(|e| e.short_ref.clone())
            .or_else(|| Some(reference::generate(all, now.date_naive())));
    }

    // email alias sync
    if rec.customer_email.is_none() && rec.email.is_some() {
        rec.customer_email = rec.email.clone();
    }
    if rec.email.is_none() && rec.customer_email.is_some() {
        rec.email = rec.customer_email.clone();
    }

    // paymentMode canonical: derive from the raw mode only when nothing
    // (update or existing record) supplied one.
    if rec.payment_mode.is_none() {
        rec.payment_mode = rec
            .mode
            .as_deref()
            .and_then(PaymentMode::from_raw_mode)
            .or(existing.and_then(|e| e.payment_mode));
    }

    // arrays stay materialized with empty entries dropped
    rec.services.retain(|s| !s.is_empty());
    rec.upgrades.retain(|s| !s.is_empty());

    if let Some(delivery) = rec.delivery.as_mut() {
        *delivery = delivery.to_lowercase();
    }

    rec
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2026-08-30T12:00:00Z".parse().unwrap()
    }

    fn normalized_record() -> OrderRecord {
        merge_update(
            OrderUpdate {
                email: Some("a@b.com".into()),
                name: Some("Sam".into()),
                mode: Some("payment".into()),
                services: Some(serde_json::from_value(json!(["deep_clean"])).unwrap()),
                delivery: Some("Postal".into()),
                ..OrderUpdate::new("cs_1")
            },
            None,
            &[],
            now(),
        )
    }

    #[test]
    fn normalization_is_idempotent() {
        let rec = normalized_record();
        let again = normalize_record(rec.clone(), Some(&rec), &[rec.clone()], now());
        assert_eq!(again, rec);

        // An empty update against the same record is also a no-op.
        let merged = merge_update(OrderUpdate::new("cs_1"), Some(&rec), &[rec.clone()], now());
        assert_eq!(merged, rec);
    }

    #[test]
    fn first_write_stamps_created_at_and_short_ref() {
        let rec = normalized_record();
        assert_eq!(rec.created_at, Some(now()));
        assert_eq!(rec.short_ref.as_deref(), Some("SM-20260830-001"));
    }

    #[test]
    fn created_at_is_write_once() {
        let rec = normalized_record();
        let later: DateTime<Utc> = "2026-09-01T00:00:00Z".parse().unwrap();
        let merged = merge_update(
            OrderUpdate { created_at: Some(later), ..OrderUpdate::new("cs_1") },
            Some(&rec),
            &[rec.clone()],
            later,
        );
        assert_eq!(merged.created_at, rec.created_at);
        assert_eq!(merged.short_ref, rec.short_ref);
    }

    #[test]
    fn email_alias_sync_both_directions() {
        let rec = normalized_record();
        assert_eq!(rec.customer_email.as_deref(), Some("a@b.com"));
        assert_eq!(rec.email.as_deref(), Some("a@b.com"));

        let merged = merge_update(
            OrderUpdate { customer_email: Some("c@d.com".into()), ..OrderUpdate::new("cs_2") },
            None,
            &[],
            now(),
        );
        assert_eq!(merged.email.as_deref(), Some("c@d.com"));
    }

    #[test]
    fn payment_mode_derived_from_raw_mode() {
        let rec = normalized_record();
        assert_eq!(rec.payment_mode, Some(PaymentMode::OneOff));

        let merged = merge_update(
            OrderUpdate { mode: Some("setup".into()), ..OrderUpdate::new("cs_3") },
            None,
            &[],
            now(),
        );
        assert_eq!(merged.payment_mode, Some(PaymentMode::Unknown));
    }

    #[test]
    fn existing_payment_mode_survives_when_update_has_none() {
        let rec = normalized_record();
        let merged = merge_update(OrderUpdate::new("cs_1"), Some(&rec), &[rec.clone()], now());
        assert_eq!(merged.payment_mode, Some(PaymentMode::OneOff));
    }

    #[test]
    fn arrays_coerce_from_all_shapes() {
        for input in [json!(["x", "y"]), json!("[\"x\",\"y\"]"), json!("x,y")] {
            let merged = merge_update(
                OrderUpdate { services: Some(serde_json::from_value(input).unwrap()), ..OrderUpdate::new("cs_4") },
                None,
                &[],
                now(),
            );
            assert_eq!(merged.services, vec!["x", "y"]);
        }
    }

    #[test]
    fn absent_arrays_keep_existing_values() {
        let rec = normalized_record();
        let merged = merge_update(
            OrderUpdate { payment_status: Some("paid".into()), ..OrderUpdate::new("cs_1") },
            Some(&rec),
            &[rec.clone()],
            now(),
        );
        assert_eq!(merged.services, vec!["deep_clean"]);
    }

    #[test]
    fn status_object_coerced_to_message() {
        let merged = merge_update(
            OrderUpdate {
                sendcloud_status: Some(json!({"id": 1000, "message": "Ready to send"})),
                ..OrderUpdate::new("cs_5")
            },
            None,
            &[],
            now(),
        );
        assert_eq!(merged.sendcloud_status.as_deref(), Some("Ready to send"));
    }

    #[test]
    fn delivery_lower_cased() {
        let rec = normalized_record();
        assert_eq!(rec.delivery.as_deref(), Some("postal"));
    }
}
