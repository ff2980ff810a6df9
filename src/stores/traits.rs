//! Storage backend contract and the record model shared by all backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::SessionError;

/// Opaque application data carried by a session.
pub type SessionData = HashMap<String, Value>;

/// One stored session: id, data, and expiration bookkeeping.
///
/// A record whose `expires_at` has passed is logically absent no matter
/// how promptly the owning backend purges it physically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub data: SessionData,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Fresh empty record expiring `max_age` from now.
    pub fn new(id: &str, max_age: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            data: SessionData::new(),
            created_at: now,
            expires_at: expiry_after(now, max_age),
        }
    }

    /// The single expiry predicate both backends use.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// `now + max_age`, saturating at the far end of the calendar rather
/// than failing on absurd durations.
pub(crate) fn expiry_after(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Uniform contract over the concrete storage backends.
///
/// Absence and expiry are normal results, not errors: `get` returns
/// `None`, `touch` returns `false`, and `destroy`/`clear` succeed on
/// ids that were never there. `Err` is reserved for the storage medium
/// itself failing.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live record. Expired records read as absent.
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Create or replace the record's data and extend its lifetime to
    /// `now + max_age`. A live record keeps its `created_at`.
    async fn set(
        &self,
        id: &str,
        data: SessionData,
        max_age: Duration,
    ) -> Result<SessionRecord, SessionError>;

    /// Move a live record's `expires_at` to `now + max_age` without
    /// touching its data. Returns whether a live record existed.
    async fn touch(&self, id: &str, max_age: Duration) -> Result<bool, SessionError>;

    /// Remove a record. Absence is not an error.
    async fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// Fresh snapshot of every live record, filtered against the current
    /// clock. O(number of sessions); intended for admin surfaces.
    async fn list_all(&self) -> Result<Vec<SessionRecord>, SessionError>;

    /// Remove every record.
    async fn clear(&self) -> Result<(), SessionError>;

    /// The name of this store implementation.
    fn name(&self) -> &str;

    /// Backend-preferred record lifetime, if the backend carries one
    /// (the file backend's configured ttl). The facade falls back to
    /// its own default max-age when this is `None`.
    fn default_max_age(&self) -> Option<Duration> {
        None
    }
}
