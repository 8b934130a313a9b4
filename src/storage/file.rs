use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{HistoryEntry, HistoryLog, HistoryStore, RetryPolicy};
use crate::core::{CalibrationResult, RegressionModel};
use crate::track_performance;

/// History kept as one pretty-printed JSON array on disk.
///
/// Every append rewrites the whole document through a sibling temp file and
/// an atomic rename, so readers only ever see a complete log. Appends are
/// serialised inside the process.
pub struct JsonFileStore {
    path: PathBuf,
    capacity: usize,
    retry: RetryPolicy,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and on first run create) the history file under `data_dir`.
    pub async fn open(
        data_dir: impl AsRef<Path>,
        file_name: &str,
        capacity: usize,
        retry: RetryPolicy,
    ) -> CalibrationResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).await?;

        let store = Self {
            path: data_dir.join(file_name),
            capacity,
            retry,
            write_lock: Mutex::new(()),
        };

        if !fs::try_exists(&store.path).await? {
            store.write_log(&HistoryLog::with_capacity(capacity)).await?;
            info!(path = %store.path.display(), "Initialized empty history file");
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_log(&self) -> io::Result<HistoryLog> {
        self.retry
            .run("history read", || read_entries(&self.path))
            .await
            .map(|entries| HistoryLog::from_entries(entries, self.capacity))
    }

    /// Replace the document with `log`.
    ///
    /// Only writing and syncing the temp file runs under the retry policy's
    /// timeout. An abandoned attempt leaves at most a stale temp file, which
    /// the next write truncates. The rename is awaited to completion, so an
    /// error from here always means the old document is still in place.
    async fn write_log(&self, log: &HistoryLog) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(&log.to_vec())?;
        let temp_path = self.temp_path();
        self.retry
            .run("history write", || write_synced(&temp_path, &bytes))
            .await?;

        fs::rename(&temp_path, &self.path).await
    }
}

async fn read_entries(path: &Path) -> io::Result<Vec<HistoryEntry>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn list(&self) -> CalibrationResult<Vec<HistoryEntry>> {
        track_performance!("history_list");
        Ok(self.read_log().await?.to_vec())
    }

    async fn append(
        &self,
        model: RegressionModel,
        sample_count: usize,
    ) -> CalibrationResult<HistoryEntry> {
        track_performance!("history_append");
        let _guard = self.write_lock.lock().await;

        let mut log = self.read_log().await?;
        let entry = HistoryEntry::next(log.newest(), model, sample_count);
        let evicted = log.push_front(entry.clone());
        self.write_log(&log).await?;

        debug!(
            id = entry.id,
            entries = log.len(),
            capacity = log.capacity(),
            evicted = evicted.len(),
            "Appended history entry"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CalibrationError;
    use crate::storage::HISTORY_CAPACITY;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn model() -> RegressionModel {
        RegressionModel::from_parts(0.075, 0.002, 0.9991).unwrap()
    }

    async fn open(dir: &Path) -> JsonFileStore {
        JsonFileStore::open(dir, "history.json", HISTORY_CAPACITY, RetryPolicy::none())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_store_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = open(&temp_dir.path().join("data")).await;

        assert!(store.path().exists());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let temp_dir = tempdir().unwrap();
        let store = open(temp_dir.path()).await;

        for count in 0..60 {
            store.append(model(), count).await.unwrap();
        }

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 50);
        let counts: Vec<usize> = entries.iter().map(|e| e.sample_count).collect();
        assert_eq!(counts, (10..60).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let saved = {
            let store = open(temp_dir.path()).await;
            store.append(model(), 4).await.unwrap()
        };

        let reopened = open(temp_dir.path()).await;
        assert_eq!(reopened.list().await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    async fn test_append_leaves_no_temp_file() {
        let temp_dir = tempdir().unwrap();
        let store = open(temp_dir.path()).await;
        store.append(model(), 3).await.unwrap();

        assert!(!store.temp_path().exists());
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("history.json")]);
    }

    #[tokio::test]
    async fn test_stale_temp_file_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let store = open(temp_dir.path()).await;
        let saved = store.append(model(), 3).await.unwrap();

        // Leftover of a write attempt that timed out before its rename
        std::fs::write(store.temp_path(), "[{\"id\": ").unwrap();
        assert_eq!(store.list().await.unwrap(), vec![saved.clone()]);

        let next = store.append(model(), 4).await.unwrap();
        assert!(!store.temp_path().exists());
        assert_eq!(store.list().await.unwrap(), vec![next, saved]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(open(temp_dir.path()).await);

        let handles: Vec<_> = (0..20)
            .map(|count| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append(model(), count).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 20);
        let mut counts: Vec<usize> = entries.iter().map(|e| e.sample_count).collect();
        counts.sort_unstable();
        assert_eq!(counts, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let temp_dir = tempdir().unwrap();
        let store = open(temp_dir.path()).await;
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(
            store.list().await,
            Err(CalibrationError::StoreIo(_))
        ));
        assert!(matches!(
            store.append(model(), 2).await,
            Err(CalibrationError::StoreIo(_))
        ));
        // The damaged document is left for inspection rather than reset
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_reads_legacy_history_document() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("history.json"),
            r#"[
  {
    "id": 1718000000000,
    "timestamp": "2024-06-10T06:13:20.000Z",
    "model": { "m": 0.0748, "b": 0.0018, "r2": 0.9999 },
    "sampleCount": 6
  }
]"#,
        )
        .unwrap();

        let store = open(temp_dir.path()).await;
        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sample_count, 6);

        let next = store.append(model(), 5).await.unwrap();
        assert!(next.id > 1718000000000);
    }
}
