//! Short reference generation (`SM-YYYYMMDD-NNN`)

use chrono::NaiveDate;

use super::order::OrderRecord;

pub const REF_PREFIX: &str = "SM";

/// Next sequential reference for `today`, one past the highest sequence
/// number already present for that date prefix. Scans the full collection
/// rather than counting today's records, so the counter never regresses
/// when higher-numbered refs exist from clock skew or backfilled data.
/// Best-effort and non-atomic; the store serializes writers in-process.
pub fn generate(existing: &[OrderRecord], today: NaiveDate) -> String {
    let prefix = format!("{}-{}-", REF_PREFIX, today.format("%Y%m%d"));

    let mut max = 0u32;
    for order in existing {
        let Some(short_ref) = order.short_ref.as_deref() else { continue };
        let Some(rest) = short_ref.strip_prefix(&prefix) else { continue };
        if let Ok(n) = rest.parse::<u32>() {
            max = max.max(n);
        }
    }

    format!("{}{:03}", prefix, max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_ref(short_ref: &str) -> OrderRecord {
        OrderRecord { short_ref: Some(short_ref.to_string()), ..OrderRecord::stub("x") }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 30).unwrap()
    }

    #[test]
    fn starts_at_001() {
        assert_eq!(generate(&[], day()), "SM-20260830-001");
    }

    #[test]
    fn sequence_is_monotonic() {
        let mut orders = vec![];
        for expected in ["SM-20260830-001", "SM-20260830-002", "SM-20260830-003"] {
            let next = generate(&orders, day());
            assert_eq!(next, expected);
            orders.push(with_ref(&next));
        }
    }

    #[test]
    fn scans_for_max_not_count() {
        // A higher-numbered ref inserted out of order must not be reissued.
        let orders = vec![with_ref("SM-20260830-003")];
        assert_eq!(generate(&orders, day()), "SM-20260830-004");
    }

    #[test]
    fn other_dates_do_not_count() {
        let orders = vec![with_ref("SM-20260829-009"), with_ref("SM-20260830-001")];
        assert_eq!(generate(&orders, day()), "SM-20260830-002");
    }

    #[test]
    fn malformed_refs_are_ignored() {
        let orders = vec![with_ref("SM-20260830-xyz"), OrderRecord::stub("no-ref")];
        assert_eq!(generate(&orders, day()), "SM-20260830-001");
    }
}
