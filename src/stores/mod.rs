//! Session storage backends and the factory that selects one.

pub mod file;
mod maintenance;
pub mod memory;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{SessionData, SessionRecord, SessionStore};

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Factory: build the configured session store backend.
///
/// Validates the config first; an unknown backend name is a
/// [`SessionError::Configuration`]. Eager-started maintenance (memory
/// cleanup/index intervals, file sweep interval) requires a Tokio
/// runtime to be current.
pub async fn create_store(config: &SessionConfig) -> Result<Box<dyn SessionStore>, SessionError> {
    config.validate()?;
    match config.store.backend.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(Box::new(MemoryStore::with_config(&config.store.memory))),
        "file" => Ok(Box::new(FileStore::with_config(&config.store.file).await?)),
        other => Err(SessionError::Configuration(format!(
            "unknown session store backend: {other:?}"
        ))),
    }
}
