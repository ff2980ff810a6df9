pub mod schema;

pub use schema::{FileStoreConfig, MemoryStoreConfig, SessionConfig, StoreConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = SessionConfig::new("keyboard cat");

        assert_eq!(config.store.backend, "memory");
        assert!(config.store.memory.cleanup_interval_secs.is_none());
        assert!(config.validate().is_ok());
    }
}
