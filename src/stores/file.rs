//! File-backed session store: one JSON document per session.
//!
//! Chosen over the memory backend when sessions must survive a process
//! restart; every operation pays per-record I/O for that durability.
//! Expiration is enforced lazily on read, so no background task is
//! required for correctness — the optional sweep only reclaims disk
//! space from sessions nobody has read since they expired.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::maintenance::{self, MaintenanceTask};
use super::traits::{expiry_after, SessionData, SessionRecord, SessionStore};
use crate::config::FileStoreConfig;
use crate::error::SessionError;
use crate::identifier;

const RECORD_EXT: &str = "json";

/// File-backed session store.
pub struct FileStore {
    dir: PathBuf,
    ttl: Duration,
    sweep: Mutex<Option<MaintenanceTask>>,
}

impl FileStore {
    /// Store over `dir` with the given record lifetime. No I/O happens
    /// until the first operation; call [`FileStore::ensure_directory`]
    /// to fail fast on an unusable directory.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            sweep: Mutex::new(None),
        }
    }

    /// Store built from config: directory created up front, sweep task
    /// eager-started when an interval is configured (requires a Tokio
    /// runtime).
    pub async fn with_config(config: &FileStoreConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let store = Self::new(config.path.clone(), config.ttl());
        store.ensure_directory().await?;
        if let Some(every) = config.sweep_interval() {
            store.start_sweep(every);
        }
        Ok(store)
    }

    /// Idempotent creation of the storage directory.
    pub async fn ensure_directory(&self) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Delete every expired record file; returns how many were removed.
    /// Unparseable files are left alone (a later read reports them
    /// absent; deleting here could destroy evidence of a real problem).
    pub async fn sweep(&self) -> Result<usize, SessionError> {
        sweep_dir(&self.dir).await
    }

    /// Start the periodic sweep task. No-op if already running.
    pub fn start_sweep(&self, every: Duration) {
        let mut slot = self.sweep.lock();
        if slot.is_some() {
            return;
        }
        let dir = self.dir.clone();
        *slot = Some(maintenance::spawn("sweep", every, move || {
            let dir = dir.clone();
            async move {
                match sweep_dir(&dir).await {
                    Ok(removed) if removed > 0 => debug!(removed, "swept expired session files"),
                    Ok(_) => {}
                    // A failed pass logs and retries on the next tick.
                    Err(error) => warn!(%error, "session sweep pass failed"),
                }
            }
        }));
    }

    /// Stop the sweep task after its current pass. Idempotent.
    pub fn stop_sweep(&self) {
        if let Some(task) = self.sweep.lock().take() {
            task.stop();
        }
    }

    pub fn sweep_running(&self) -> bool {
        self.sweep.lock().is_some()
    }

    /// Map an id onto its record file, refusing anything that could
    /// escape the storage directory.
    fn record_path(&self, id: &str) -> Result<PathBuf, SessionError> {
        if !identifier::is_safe_id(id) {
            return Err(SessionError::MalformedIdentifier);
        }
        Ok(self.dir.join(format!("{id}.{RECORD_EXT}")))
    }

    /// Write the record to a uniquely-named sibling then rename it over
    /// the final path, so a concurrent reader sees either the previous
    /// or the new complete document, never a torn one.
    async fn write_atomic(&self, path: &Path, record: &SessionRecord) -> Result<(), SessionError> {
        let payload = serde_json::to_vec(record)?;
        let mut suffix = [0u8; 8];
        OsRng.fill_bytes(&mut suffix);
        let tmp = self
            .dir
            .join(format!("{}.{RECORD_EXT}.tmp-{}", record.id, hex::encode(suffix)));
        tokio::fs::write(&tmp, &payload).await?;
        if let Err(error) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(error.into());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let path = self.record_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let record: SessionRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(error) => {
                warn!(id, %error, "unreadable session file treated as absent");
                return Ok(None);
            }
        };
        if record.is_expired() {
            // Best-effort reclaim of the stale file.
            if let Err(error) = tokio::fs::remove_file(&path).await {
                if error.kind() != ErrorKind::NotFound {
                    warn!(id, %error, "failed to remove expired session file");
                }
            }
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn set(
        &self,
        id: &str,
        data: SessionData,
        max_age: Duration,
    ) -> Result<SessionRecord, SessionError> {
        let path = self.record_path(id)?;
        self.ensure_directory().await?;
        let now = Utc::now();
        let created_at = match self.get(id).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        let record = SessionRecord {
            id: id.to_string(),
            data,
            created_at,
            expires_at: expiry_after(now, max_age),
        };
        self.write_atomic(&path, &record).await?;
        Ok(record)
    }

    async fn touch(&self, id: &str, max_age: Duration) -> Result<bool, SessionError> {
        let path = self.record_path(id)?;
        let Some(mut record) = self.get(id).await? else {
            return Ok(false);
        };
        record.expires_at = expiry_after(Utc::now(), max_age);
        self.write_atomic(&path, &record).await?;
        Ok(true)
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let path = self.record_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let now = Utc::now();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Racing a delete is fine in a snapshot view.
                Err(_) => continue,
            };
            match serde_json::from_slice::<SessionRecord>(&bytes) {
                Ok(record) if !record.is_expired_at(now) => records.push(record),
                Ok(_) => {}
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unparseable session file");
                }
            }
        }
        Ok(records)
    }

    async fn clear(&self) -> Result<(), SessionError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let is_ours = name
                .to_str()
                .is_some_and(|n| n.contains(&format!(".{RECORD_EXT}")));
            if !is_ours {
                continue;
            }
            if let Err(error) = tokio::fs::remove_file(&path).await {
                if error.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), %error, "failed to remove session file");
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }

    fn default_max_age(&self) -> Option<Duration> {
        Some(self.ttl)
    }
}

async fn sweep_dir(dir: &Path) -> Result<usize, SessionError> {
    let now = Utc::now();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error.into()),
    };
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes) else {
            continue;
        };
        if record.is_expired_at(now) && tokio::fs::remove_file(&path).await.is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> FileStore {
        FileStore::new(tmp.path(), Duration::from_secs(60))
    }

    fn data_with(key: &str, value: serde_json::Value) -> SessionData {
        let mut data = SessionData::new();
        data.insert(key.to_string(), value);
        data
    }

    #[tokio::test]
    async fn set_then_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store
            .set("a", data_with("visits", json!(1)), Duration::from_secs(60))
            .await
            .unwrap();

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.data.get("visits"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn get_absent_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_file_is_deleted_on_read() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store
            .set("a", SessionData::new(), Duration::from_millis(20))
            .await
            .unwrap();
        let path = tmp.path().join("a.json");
        assert!(path.exists());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("a").await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn touch_extends_expiry_and_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let before = store
            .set("a", data_with("n", json!(9)), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(store.touch("a", Duration::from_secs(3600)).await.unwrap());
        let after = store.get("a").await.unwrap().unwrap();
        assert!(after.expires_at > before.expires_at);
        assert_eq!(after.data.get("n"), Some(&json!(9)));
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn touch_absent_or_expired_returns_false() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(!store.touch("nope", Duration::from_secs(60)).await.unwrap());

        store
            .set("a", SessionData::new(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.touch("a", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn destroy_removes_file_and_tolerates_absence() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store
            .set("a", SessionData::new(), Duration::from_secs(60))
            .await
            .unwrap();
        store.destroy("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        store.destroy("a").await.unwrap();
    }

    #[tokio::test]
    async fn set_preserves_created_at_for_live_record() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let first = store
            .set("a", data_with("n", json!(1)), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = store
            .set("a", data_with("n", json!(2)), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn list_all_skips_expired_and_unparseable_files() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        for id in ["live-1", "live-2", "live-3"] {
            store
                .set(id, SessionData::new(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        for id in ["dead-1", "dead-2"] {
            store
                .set(id, SessionData::new(), Duration::from_millis(10))
                .await
                .unwrap();
        }
        std::fs::write(tmp.path().join("corrupt.json"), b"{not json").unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let mut ids: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["live-1", "live-2", "live-3"]);
    }

    #[tokio::test]
    async fn clear_removes_every_record_file() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        for id in ["a", "b", "c"] {
            store
                .set(id, SessionData::new(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        store.clear().await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(!tmp.path().join("a.json").exists());
    }

    #[tokio::test]
    async fn path_traversal_ids_are_rejected_without_io() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        for id in ["../evil", "a/b", "a\\b", "", "a.json"] {
            assert!(matches!(
                store.get(id).await,
                Err(SessionError::MalformedIdentifier)
            ));
            assert!(matches!(
                store
                    .set(id, SessionData::new(), Duration::from_secs(60))
                    .await,
                Err(SessionError::MalformedIdentifier)
            ));
        }
        // Nothing was written anywhere.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn records_survive_store_reconstruction() {
        let tmp = TempDir::new().unwrap();
        {
            let store = store_in(&tmp);
            store
                .set("a", data_with("n", json!(5)), Duration::from_secs(60))
                .await
                .unwrap();
        }
        let reopened = store_in(&tmp);
        let record = reopened.get("a").await.unwrap().unwrap();
        assert_eq!(record.data.get("n"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn concurrent_writers_leave_one_complete_document() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(store_in(&tmp));

        let writer = |value: i64| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .set("contended", data_with("w", json!(value)), Duration::from_secs(60))
                        .await
                        .unwrap();
                }
            })
        };
        let (a, b) = (writer(1), writer(2));
        a.await.unwrap();
        b.await.unwrap();

        let bytes = std::fs::read(tmp.path().join("contended.json")).unwrap();
        let record: SessionRecord = serde_json::from_slice(&bytes).unwrap();
        let w = record.data.get("w").and_then(|v| v.as_i64()).unwrap();
        assert!(w == 1 || w == 2);
    }

    #[tokio::test]
    async fn sweep_removes_expired_files_and_keeps_live_ones() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store
            .set("live", SessionData::new(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("dead", SessionData::new(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.sweep().await.unwrap(), 1);
        assert!(tmp.path().join("live.json").exists());
        assert!(!tmp.path().join("dead.json").exists());
    }

    #[tokio::test]
    async fn sweep_task_reclaims_disk_without_reads() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store
            .set("dead", SessionData::new(), Duration::from_millis(25))
            .await
            .unwrap();
        store.start_sweep(Duration::from_millis(50));
        assert!(store.sweep_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!tmp.path().join("dead.json").exists());

        store.stop_sweep();
        store.stop_sweep();
        assert!(!store.sweep_running());
    }

    #[tokio::test]
    async fn with_config_creates_directory_and_reports_ttl() {
        let tmp = TempDir::new().unwrap();
        let config = FileStoreConfig {
            path: tmp.path().join("nested").join("sessions"),
            ttl_secs: 120,
            sweep_interval_secs: None,
        };
        let store = FileStore::with_config(&config).await.unwrap();
        assert!(config.path.is_dir());
        assert_eq!(store.default_max_age(), Some(Duration::from_secs(120)));
        assert_eq!(store.name(), "file");
    }
}
