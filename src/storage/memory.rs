use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{HistoryEntry, HistoryLog, HistoryStore};
use crate::core::{CalibrationResult, RegressionModel};

/// Process-local history, lost on exit.
pub struct MemoryStore {
    log: RwLock<HistoryLog>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: RwLock::new(HistoryLog::with_capacity(capacity)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            log: RwLock::new(HistoryLog::default()),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn list(&self) -> CalibrationResult<Vec<HistoryEntry>> {
        Ok(self.log.read().await.to_vec())
    }

    async fn append(
        &self,
        model: RegressionModel,
        sample_count: usize,
    ) -> CalibrationResult<HistoryEntry> {
        Ok(self.log.write().await.record(model, sample_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new(2);
        assert!(store.list().await.unwrap().is_empty());

        let model = RegressionModel::from_parts(1.5, 0.0, 1.0).unwrap();
        for count in 2..5 {
            assert_ok!(store.append(model, count).await);
        }

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sample_count, 4);
        assert_eq!(entries[1].sample_count, 3);
    }
}
