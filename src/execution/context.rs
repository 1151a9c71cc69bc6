//! Per-request execution state

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

/// Mutable state of one request
///
/// The clock is read once, so every row written by a mutation carries the
/// same `createdAt` / `updatedAt`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    now: DateTime<Utc>,
    touched: IndexMap<String, Vec<Uuid>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_clock(Utc::now())
    }

    /// Use a fixed request time
    ///
    /// Truncated to microseconds, the precision of `TIMESTAMPTZ` and
    /// `DATETIME(6)`, so values read back compare equal.
    pub fn with_clock(now: DateTime<Utc>) -> Self {
        let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
        Self {
            now,
            touched: IndexMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Merge ids written by a committed mutation
    pub fn record_touched(&mut self, touched: &IndexMap<String, Vec<Uuid>>) {
        for (type_name, ids) in touched {
            let entry = self.touched.entry(type_name.clone()).or_default();
            for id in ids {
                if !entry.contains(id) {
                    entry.push(*id);
                }
            }
        }
    }

    /// Ids written per entity type, in write order
    pub fn touched_ids(&self) -> &IndexMap<String, Vec<Uuid>> {
        &self.touched
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
