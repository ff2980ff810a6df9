#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::uninlined_format_args
)]

//! Pluggable, TTL-aware session storage.
//!
//! Records live behind one [`SessionStore`] contract with two backends:
//! an in-memory table with background expiration maintenance, and a
//! directory of per-session JSON files with lazy expiration and atomic
//! writes. [`SessionManager`] fronts whichever backend is configured
//! and signs session identifiers (HMAC-SHA256) at the transport
//! boundary so clients cannot forge or tamper with them.

pub mod config;
pub mod error;
pub mod identifier;
pub mod manager;
pub mod stores;

pub use config::{FileStoreConfig, MemoryStoreConfig, SessionConfig, StoreConfig};
pub use error::SessionError;
pub use manager::{IdentifierTransport, ResolvedIdentifier, SessionManager};
pub use stores::{create_store, FileStore, MemoryStore, SessionData, SessionRecord, SessionStore};
