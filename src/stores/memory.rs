//! In-memory session store with background expiration maintenance.
//!
//! The primary table is a mutex-guarded map. The expiration index is an
//! immutable sorted snapshot behind an `Arc`, rebuilt wholesale by its
//! own task and swapped atomically, so cleanup always reads a complete
//! (if stale) index. Staleness is tolerated in one direction only: the
//! index may list ids that were destroyed or re-touched (cleanup
//! re-validates against the live table before removing anything), but a
//! true expiration is never skipped — cleanup also scans the table for
//! expired records the index has not seen yet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::maintenance::{self, MaintenanceTask};
use super::traits::{expiry_after, SessionData, SessionRecord, SessionStore};
use crate::config::MemoryStoreConfig;
use crate::error::SessionError;

type ExpirationIndex = Arc<Vec<(DateTime<Utc>, String)>>;

struct MemoryInner {
    records: Mutex<HashMap<String, SessionRecord>>,
    index: Mutex<ExpirationIndex>,
}

impl MemoryInner {
    fn cleanup_pass(&self) -> usize {
        let now = Utc::now();
        let index: ExpirationIndex = self.index.lock().clone();
        let mut records = self.records.lock();
        let mut removed = 0;

        // Index candidates, re-validated against the live table: an id
        // re-touched after it was indexed must survive.
        for (indexed_expiry, id) in index.iter() {
            if *indexed_expiry > now {
                break; // sorted ascending, the rest are in the future
            }
            if records.get(id).is_some_and(|r| r.is_expired_at(now)) {
                records.remove(id);
                removed += 1;
            }
        }

        // Records written since the last rebuild are invisible to the
        // index; scan the table so staleness never hides an expiration.
        let stragglers: Vec<String> = records
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.id.clone())
            .collect();
        for id in &stragglers {
            records.remove(id);
        }
        removed + stragglers.len()
    }

    fn rebuild_pass(&self) -> usize {
        let mut entries: Vec<(DateTime<Utc>, String)> = {
            let records = self.records.lock();
            records
                .values()
                .map(|r| (r.expires_at, r.id.clone()))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let len = entries.len();
        *self.index.lock() = Arc::new(entries);
        len
    }
}

/// In-memory session store.
///
/// Maintenance tasks are per-instance and idle until started (or
/// eager-started from [`MemoryStoreConfig`] intervals, which requires a
/// Tokio runtime). Dropping the store stops both tasks.
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
    cleanup: Mutex<Option<MaintenanceTask>>,
    index_rebuild: Mutex<Option<MaintenanceTask>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                records: Mutex::new(HashMap::new()),
                index: Mutex::new(Arc::new(Vec::new())),
            }),
            cleanup: Mutex::new(None),
            index_rebuild: Mutex::new(None),
        }
    }

    /// Store with maintenance tasks eager-started per config.
    pub fn with_config(config: &MemoryStoreConfig) -> Self {
        let store = Self::new();
        if let Some(every) = config.cleanup_interval() {
            store.start_cleanup(every);
        }
        if let Some(every) = config.index_interval() {
            store.start_index_rebuild(every);
        }
        store
    }

    /// Run one cleanup pass now; returns how many records were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.inner.cleanup_pass()
    }

    /// Rebuild the expiration index now; returns its entry count.
    pub fn rebuild_index(&self) -> usize {
        self.inner.rebuild_pass()
    }

    /// Start the periodic cleanup task. No-op if already running.
    pub fn start_cleanup(&self, every: Duration) {
        let mut slot = self.cleanup.lock();
        if slot.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *slot = Some(maintenance::spawn("cleanup", every, move || {
            let inner = Arc::clone(&inner);
            async move {
                let removed = inner.cleanup_pass();
                if removed > 0 {
                    debug!(removed, "removed expired sessions");
                }
            }
        }));
    }

    /// Stop the cleanup task after its current pass. Idempotent; the
    /// index-rebuild task is unaffected.
    pub fn stop_cleanup(&self) {
        if let Some(task) = self.cleanup.lock().take() {
            task.stop();
        }
    }

    /// Start the periodic index-rebuild task. No-op if already running.
    pub fn start_index_rebuild(&self, every: Duration) {
        let mut slot = self.index_rebuild.lock();
        if slot.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *slot = Some(maintenance::spawn("index-rebuild", every, move || {
            let inner = Arc::clone(&inner);
            async move {
                let entries = inner.rebuild_pass();
                debug!(entries, "rebuilt session expiration index");
            }
        }));
    }

    /// Stop the index-rebuild task after its current pass. Idempotent.
    pub fn stop_index_rebuild(&self) {
        if let Some(task) = self.index_rebuild.lock().take() {
            task.stop();
        }
    }

    pub fn cleanup_running(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    pub fn index_rebuild_running(&self) -> bool {
        self.index_rebuild.lock().is_some()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let now = Utc::now();
        let mut records = self.inner.records.lock();
        if records.get(id).is_some_and(|r| r.is_expired_at(now)) {
            records.remove(id);
            return Ok(None);
        }
        Ok(records.get(id).cloned())
    }

    async fn set(
        &self,
        id: &str,
        data: SessionData,
        max_age: Duration,
    ) -> Result<SessionRecord, SessionError> {
        let now = Utc::now();
        let expires_at = expiry_after(now, max_age);
        let mut records = self.inner.records.lock();
        // A live record keeps its creation time; an expired leftover is
        // replaced as if it had been purged already.
        let created_at = match records.get(id) {
            Some(existing) if !existing.is_expired_at(now) => existing.created_at,
            _ => now,
        };
        let record = SessionRecord {
            id: id.to_string(),
            data,
            created_at,
            expires_at,
        };
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn touch(&self, id: &str, max_age: Duration) -> Result<bool, SessionError> {
        let now = Utc::now();
        let mut records = self.inner.records.lock();
        if records.get(id).is_some_and(|r| r.is_expired_at(now)) {
            records.remove(id);
            return Ok(false);
        }
        match records.get_mut(id) {
            Some(record) => {
                record.expires_at = expiry_after(now, max_age);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.inner.records.lock().remove(id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let now = Utc::now();
        let records = self.inner.records.lock();
        Ok(records
            .values()
            .filter(|r| !r.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.inner.records.lock().clear();
        *self.inner.index.lock() = Arc::new(Vec::new());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
