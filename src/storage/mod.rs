//! Persistent, capacity-bounded log of past calibration fits.

mod file;
mod memory;
mod retry;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use retry::{BackoffStrategy, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::{CalibrationResult, RegressionModel};

/// Number of fits the history keeps by default.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Creation time in milliseconds, strictly increasing within one store
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub model: RegressionModel,
    pub sample_count: usize,
}

impl HistoryEntry {
    /// Build the entry that follows `newest` in a log.
    ///
    /// Ids come from the wall clock; two saves within the same millisecond
    /// (or a clock step backwards) still get ordered ids.
    pub fn next(
        newest: Option<&HistoryEntry>,
        model: RegressionModel,
        sample_count: usize,
    ) -> Self {
        let timestamp = Utc::now();
        let mut id = timestamp.timestamp_millis();
        if let Some(previous) = newest {
            id = id.max(previous.id.saturating_add(1));
        }

        Self {
            id,
            timestamp,
            model,
            sample_count,
        }
    }
}

/// Newest-first sequence of entries that never grows past its capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl HistoryLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Load entries already in newest-first order, dropping any past the
    /// capacity.
    pub fn from_entries(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut log = Self::with_capacity(capacity);
        log.entries.extend(entries.into_iter().take(log.capacity));
        log
    }

    /// Insert `entry` as the newest item and return whatever fell off the
    /// old end.
    pub fn push_front(&mut self, entry: HistoryEntry) -> Vec<HistoryEntry> {
        self.entries.push_front(entry);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.entries.pop_back() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    /// Create and insert the next entry for `model`.
    pub fn record(&mut self, model: RegressionModel, sample_count: usize) -> HistoryEntry {
        let entry = HistoryEntry::next(self.newest(), model, sample_count);
        self.push_front(entry.clone());
        entry
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All recorded fits, newest first. Empty when nothing was ever saved.
    async fn list(&self) -> CalibrationResult<Vec<HistoryEntry>>;

    /// Record `model` as the newest fit and persist the log before
    /// returning the created entry.
    async fn append(
        &self,
        model: RegressionModel,
        sample_count: usize,
    ) -> CalibrationResult<HistoryEntry>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model(m: f64) -> RegressionModel {
        RegressionModel::from_parts(m, 0.01, 0.99).unwrap()
    }

    #[test]
    fn test_push_front_evicts_oldest() {
        let mut log = HistoryLog::with_capacity(3);
        for i in 1..=5 {
            log.record(model(i as f64), i);
        }

        assert_eq!(log.len(), 3);
        let counts: Vec<usize> = log.iter().map(|e| e.sample_count).collect();
        assert_eq!(counts, vec![5, 4, 3]);
    }

    #[test]
    fn test_push_front_reports_evicted_entries() {
        let mut log = HistoryLog::with_capacity(1);
        let first = log.record(model(1.0), 2);
        let evicted = log.push_front(HistoryEntry::next(log.newest(), model(2.0), 3));

        assert_eq!(evicted, vec![first]);
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut log = HistoryLog::default();
        for _ in 0..20 {
            log.record(model(1.0), 2);
        }

        let ids: Vec<i64> = log.iter().map(|e| e.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn test_next_id_saturates_at_max() {
        let mut newest = HistoryEntry::next(None, model(1.0), 2);
        newest.id = i64::MAX;

        let entry = HistoryEntry::next(Some(&newest), model(1.0), 3);
        assert_eq!(entry.id, i64::MAX);
    }

    #[test]
    fn test_from_entries_truncates_to_capacity() {
        let mut source = HistoryLog::with_capacity(80);
        for i in 0..80 {
            source.record(model(1.0), i);
        }

        let log = HistoryLog::from_entries(source.to_vec(), HISTORY_CAPACITY);
        assert_eq!(log.len(), HISTORY_CAPACITY);
        assert_eq!(log.newest().map(|e| e.sample_count), Some(79));
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = HistoryEntry::next(None, model(2.0), 6);
        let json = serde_json::to_value(&entry).unwrap();

        assert!(json.get("sampleCount").is_some());
        assert_eq!(json["model"]["m"], serde_json::json!(2.0));
        let parsed: HistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, entry);
    }
}
