//! Flat-file order store
//!
//! One JSON document holds the whole collection; every write reads it all,
//! merges one record through the normalizer and rewrites the file. New
//! records are prepended, so listing is newest-first. The store itself does
//! not lock; callers serialize writers (AppState wraps it in a mutex).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::history::{self, ShippingUpdate};
use crate::domain::normalize;
use crate::domain::order::{OrderRecord, OrderUpdate};
use crate::Result;

pub struct OrderStore {
    path: PathBuf,
}

impl OrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, insertion order (newest first). A missing, unreadable
    /// or corrupt backing file reads as an empty collection.
    pub fn list(&self) -> Vec<OrderRecord> {
        self.read_all()
    }

    pub fn get(&self, id: &str) -> Option<OrderRecord> {
        self.read_all().into_iter().find(|o| o.id == id)
    }

    /// Sole write path: merge a partial update into the collection. Only
    /// `id` is required; `createdAt` and `shortRef` are protected.
    pub fn upsert(&self, update: OrderUpdate) -> Result<OrderRecord> {
        self.upsert_at(update, Utc::now())
    }

    pub fn upsert_at(&self, update: OrderUpdate, now: DateTime<Utc>) -> Result<OrderRecord> {
        let mut orders = self.read_all();
        let idx = orders.iter().position(|o| o.id == update.id);
        let existing = idx.map(|i| orders[i].clone());

        let merged = normalize::merge_update(update, existing.as_ref(), &orders, now);

        match idx {
            Some(i) => orders[i] = merged.clone(),
            None => orders.insert(0, merged.clone()),
        }

        self.write_all(&orders)?;
        Ok(merged)
    }

    /// History-safe shipping update: overlays the parcel fields through the
    /// status tracker and persists via the normalizer. Creates a stub when
    /// the order does not exist yet (the webhook path can race creation).
    pub fn record_shipping_update(&self, id: &str, incoming: &ShippingUpdate) -> Result<OrderRecord> {
        self.record_shipping_update_at(id, incoming, Utc::now())
    }

    pub fn record_shipping_update_at(
        &self,
        id: &str,
        incoming: &ShippingUpdate,
        now: DateTime<Utc>,
    ) -> Result<OrderRecord> {
        let mut orders = self.read_all();
        let idx = orders.iter().position(|o| o.id == id);
        let existing = idx.map(|i| orders[i].clone());

        let base = existing.clone().unwrap_or_else(|| OrderRecord::stub(id));
        let next = history::apply_status_update(&base, incoming, now);
        let merged = normalize::normalize_record(next, existing.as_ref(), &orders, now);

        match idx {
            Some(i) => orders[i] = merged.clone(),
            None => orders.insert(0, merged.clone()),
        }

        self.write_all(&orders)?;
        Ok(merged)
    }

    fn read_all(&self) -> Vec<OrderRecord> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    fn write_all(&self, orders: &[OrderRecord]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(orders)?)?;
        Ok(())
    }
}
