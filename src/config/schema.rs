use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SessionError;

// ── Top-level config ──────────────────────────────────────────────

/// Session engine configuration.
///
/// The structs here only hold values; loading them from a config file or
/// the environment is the embedding application's job. Every constructor
/// that takes a `SessionConfig` runs [`SessionConfig::validate`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Signing key for session identifiers. Required, non-empty.
    pub secret: String,
    /// Default record lifetime in seconds. Default: 86400 (one day).
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Backend selection and per-backend options (`[store]`).
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_max_age_secs() -> u64 {
    86_400
}

impl SessionConfig {
    /// Config with the given secret and defaults everywhere else
    /// (memory backend, one-day max-age, no eager maintenance).
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            max_age_secs: default_max_age_secs(),
            store: StoreConfig::default(),
        }
    }

    /// Default record lifetime as a `Duration`.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Reject unusable option values before any store is built.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.secret.is_empty() {
            return Err(SessionError::Configuration(
                "secret must not be empty".into(),
            ));
        }
        if self.max_age_secs == 0 {
            return Err(SessionError::Configuration(
                "max_age_secs must be positive".into(),
            ));
        }
        match self.store.backend.trim().to_ascii_lowercase().as_str() {
            "memory" | "file" => {}
            other => {
                return Err(SessionError::Configuration(format!(
                    "unknown session store backend: {other:?} (expected \"memory\" or \"file\")"
                )))
            }
        }
        self.store.memory.validate()?;
        self.store.file.validate()?;
        Ok(())
    }
}

// ── Store selection ───────────────────────────────────────────────

/// Backend selection plus per-backend options (`[store]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend: `"memory"` or `"file"`. Default: `"memory"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Memory backend options (`[store.memory]`).
    #[serde(default)]
    pub memory: MemoryStoreConfig,
    /// File backend options (`[store.file]`).
    #[serde(default)]
    pub file: FileStoreConfig,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            memory: MemoryStoreConfig::default(),
            file: FileStoreConfig::default(),
        }
    }
}

// ── Memory backend ────────────────────────────────────────────────

/// Memory backend options (`[store.memory]` section).
///
/// Both intervals are optional: when present the matching maintenance
/// task is started eagerly at construction, when absent the task stays
/// idle until started explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Seconds between expired-record cleanup passes.
    #[serde(default)]
    pub cleanup_interval_secs: Option<u64>,
    /// Seconds between expiration-index rebuilds.
    #[serde(default)]
    pub index_interval_secs: Option<u64>,
}

impl MemoryStoreConfig {
    pub(crate) fn validate(&self) -> Result<(), SessionError> {
        if self.cleanup_interval_secs == Some(0) {
            return Err(SessionError::Configuration(
                "store.memory.cleanup_interval_secs must be positive".into(),
            ));
        }
        if self.index_interval_secs == Some(0) {
            return Err(SessionError::Configuration(
                "store.memory.index_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn cleanup_interval(&self) -> Option<Duration> {
        self.cleanup_interval_secs.map(Duration::from_secs)
    }

    pub(crate) fn index_interval(&self) -> Option<Duration> {
        self.index_interval_secs.map(Duration::from_secs)
    }
}

// ── File backend ──────────────────────────────────────────────────

/// File backend options (`[store.file]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory holding one file per session. Created if missing.
    #[serde(default = "default_file_path")]
    pub path: PathBuf,
    /// Per-record time-to-live in seconds. Default: 86400.
    #[serde(default = "default_file_ttl_secs")]
    pub ttl_secs: u64,
    /// Seconds between expired-file sweeps. Absent: no sweep task runs;
    /// expiration is still enforced lazily on every read.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

fn default_file_path() -> PathBuf {
    PathBuf::from("./sessions")
}

fn default_file_ttl_secs() -> u64 {
    86_400
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: default_file_path(),
            ttl_secs: default_file_ttl_secs(),
            sweep_interval_secs: None,
        }
    }
}

impl FileStoreConfig {
    pub(crate) fn validate(&self) -> Result<(), SessionError> {
        if self.path.as_os_str().is_empty() {
            return Err(SessionError::Configuration(
                "store.file.path must not be empty".into(),
            ));
        }
        if self.ttl_secs == 0 {
            return Err(SessionError::Configuration(
                "store.file.ttl_secs must be positive".into(),
            ));
        }
        if self.sweep_interval_secs == Some(0) {
            return Err(SessionError::Configuration(
                "store.file.sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub(crate) fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}
