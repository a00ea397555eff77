//! Abandoned-checkout staging engine
//!
//! Scans unpaid orders that still carry a recovery link and advances the
//! most overdue one a single follow-up stage per run. The one-per-run cap
//! throttles outbound messaging; it is configurable but defaults to the
//! original cadence.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::messages::{self, StageMessage};
use super::order::{OrderRecord, OrderUpdate};
use crate::store::OrderStore;
use crate::Result;

/// Per-stage elapsed-minute thresholds and the per-run advance cap.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StagePolicy {
    pub stage1_min: i64,
    pub stage2_min: i64,
    pub stage3_min: i64,
    #[serde(skip)]
    pub max_advances_per_run: usize,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self { stage1_min: 10, stage2_min: 20, stage3_min: 1440, max_advances_per_run: 1 }
    }
}

/// One stage escalation performed by a run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAdvance {
    pub id: String,
    pub short_ref: Option<String>,
    pub stage: u8,
    pub minutes_since_created: i64,
    /// The payload that would be dispatched; delivery is external.
    pub message: Option<StageMessage>,
}

fn minutes_since_created(order: &OrderRecord, now: DateTime<Utc>) -> f64 {
    match order.created_at {
        Some(created) => (now - created).num_seconds() as f64 / 60.0,
        None => 0.0,
    }
}

/// Which single stage transition `order` is eligible for, if any.
/// First match wins; a stage already reached is never re-entered.
fn eligible_stage(order: &OrderRecord, policy: &StagePolicy, mins: f64) -> Option<u8> {
    let current = order.abandoned_stage;
    if current < 1 && mins >= policy.stage1_min as f64 {
        Some(1)
    } else if current < 2 && mins >= policy.stage2_min as f64 {
        Some(2)
    } else if current < 3 && mins >= policy.stage3_min as f64 {
        Some(3)
    } else {
        None
    }
}

/// One pass over the collection: pick candidates (unpaid, recovery link
/// present), oldest first, and advance up to `max_advances_per_run` of
/// them one stage each, persisting through the store's upsert path.
pub fn run_once(store: &OrderStore, policy: &StagePolicy, now: DateTime<Utc>) -> Result<Vec<StageAdvance>> {
    let mut candidates: Vec<OrderRecord> = store
        .list()
        .into_iter()
        .filter(|o| !o.is_paid() && o.has_checkout_url())
        .collect();

    // Oldest first so earlier abandons are never starved by newer ones.
    candidates.sort_by_key(|o| o.created_at.unwrap_or(DateTime::UNIX_EPOCH));

    let mut processed = Vec::new();

    for order in candidates {
        if processed.len() >= policy.max_advances_per_run {
            break;
        }

        let mins = minutes_since_created(&order, now);
        let Some(next_stage) = eligible_stage(&order, policy, mins) else { continue };

        let message = messages::for_stage(next_stage, &order);

        let saved = store.upsert_at(
            OrderUpdate {
                abandoned_stage: Some(next_stage),
                abandoned_first_at: Some(order.abandoned_first_at.unwrap_or(now)),
                abandoned_last_at: Some(now),
                ..OrderUpdate::new(order.id.clone())
            },
            now,
        )?;

        tracing::info!(
            order_id = %saved.id,
            stage = next_stage,
            minutes = mins.round() as i64,
            "abandoned checkout advanced a stage (message dispatch is log-only)"
        );

        processed.push(StageAdvance {
            id: saved.id,
            short_ref: saved.short_ref,
            stage: next_stage,
            minutes_since_created: mins.round() as i64,
            message,
        });
    }

    Ok(processed)
}
