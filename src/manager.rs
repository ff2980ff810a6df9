//! Backend-agnostic session facade.
//!
//! The manager owns identifier signing at the transport boundary: it
//! verifies whatever opaque value the transport presents, mints a fresh
//! id when there is nothing trustworthy, delegates record operations to
//! the configured backend, and tells the transport when a signed
//! identifier must be re-issued to the client. It holds no record state
//! of its own.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::identifier;
use crate::stores::{self, SessionData, SessionRecord, SessionStore};

/// The excluded transport layer's boundary: per request-like context,
/// "get the presented signed identifier" and "set the signed identifier
/// to send back", both as opaque strings. Cookie names, domains, and
/// flags never reach this crate.
pub trait IdentifierTransport {
    fn signed_identifier(&self) -> Option<String>;
    fn set_signed_identifier(&mut self, value: String);
}

/// Outcome of resolving a presented identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifier {
    pub id: String,
    /// True when the presented value was absent or unverifiable and a
    /// new id was minted in its place.
    pub freshly_minted: bool,
}

/// One operation surface over whichever backend is configured.
pub struct SessionManager {
    store: Box<dyn SessionStore>,
    secret: String,
    max_age: Duration,
}

impl SessionManager {
    /// Build a manager with the backend selected by `config`.
    pub async fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let store = stores::create_store(&config).await?;
        Self::with_store(config, store)
    }

    /// Build a manager around an injected backend (custom stores,
    /// tests). The backend's own default lifetime wins over the
    /// config's when it has one.
    pub fn with_store(
        config: SessionConfig,
        store: Box<dyn SessionStore>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let max_age = store.default_max_age().unwrap_or_else(|| config.max_age());
        Ok(Self {
            store,
            secret: config.secret,
            max_age,
        })
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Verify a presented signed identifier, or mint a fresh id.
    ///
    /// An unverifiable value (malformed or bad signature) means "no
    /// session yet", never an error: forging an identifier must not buy
    /// an attacker anything beyond an empty fresh session.
    pub fn resolve_identifier(&self, presented: Option<&str>) -> ResolvedIdentifier {
        match presented {
            Some(value) => match identifier::verify(value, &self.secret) {
                Ok(id) => ResolvedIdentifier {
                    id,
                    freshly_minted: false,
                },
                Err(error) => {
                    debug!(%error, "discarding unverifiable session identifier");
                    ResolvedIdentifier {
                        id: identifier::generate(),
                        freshly_minted: true,
                    }
                }
            },
            None => ResolvedIdentifier {
                id: identifier::generate(),
                freshly_minted: true,
            },
        }
    }

    /// Load the context's session, creating an empty one (and re-issuing
    /// the signed identifier) when there is none.
    pub async fn load<T: IdentifierTransport>(
        &self,
        ctx: &mut T,
    ) -> Result<SessionRecord, SessionError> {
        let presented = ctx.signed_identifier();
        let resolved = self.resolve_identifier(presented.as_deref());
        if let Some(record) = self.store.get(&resolved.id).await? {
            return Ok(record);
        }
        let record = self
            .store
            .set(&resolved.id, SessionData::new(), self.max_age)
            .await?;
        self.reissue(ctx, &record.id);
        Ok(record)
    }

    /// Read one key from the context's session. Never creates a session.
    pub async fn get<T: IdentifierTransport>(
        &self,
        ctx: &T,
        key: &str,
    ) -> Result<Option<Value>, SessionError> {
        let presented = ctx.signed_identifier();
        let resolved = self.resolve_identifier(presented.as_deref());
        if resolved.freshly_minted {
            return Ok(None);
        }
        Ok(self
            .store
            .get(&resolved.id)
            .await?
            .and_then(|record| record.data.get(key).cloned()))
    }

    /// Write one key into the context's session, creating the session if
    /// needed, and re-issue the signed identifier.
    pub async fn set<T: IdentifierTransport>(
        &self,
        ctx: &mut T,
        key: &str,
        value: Value,
    ) -> Result<(), SessionError> {
        let presented = ctx.signed_identifier();
        let resolved = self.resolve_identifier(presented.as_deref());
        let mut data = self
            .store
            .get(&resolved.id)
            .await?
            .map(|record| record.data)
            .unwrap_or_default();
        data.insert(key.to_string(), value);
        self.store.set(&resolved.id, data, self.max_age).await?;
        self.reissue(ctx, &resolved.id);
        Ok(())
    }

    /// Drop one key from the context's session. Returns whether the key
    /// was present.
    pub async fn remove<T: IdentifierTransport>(
        &self,
        ctx: &mut T,
        key: &str,
    ) -> Result<bool, SessionError> {
        let presented = ctx.signed_identifier();
        let resolved = self.resolve_identifier(presented.as_deref());
        if resolved.freshly_minted {
            return Ok(false);
        }
        let Some(mut record) = self.store.get(&resolved.id).await? else {
            return Ok(false);
        };
        if record.data.remove(key).is_none() {
            return Ok(false);
        }
        self.store
            .set(&resolved.id, record.data, self.max_age)
            .await?;
        self.reissue(ctx, &resolved.id);
        Ok(true)
    }

    /// Extend the context's session by the default max-age. Returns
    /// whether a live session existed.
    pub async fn touch<T: IdentifierTransport>(&self, ctx: &T) -> Result<bool, SessionError> {
        let presented = ctx.signed_identifier();
        let resolved = self.resolve_identifier(presented.as_deref());
        if resolved.freshly_minted {
            return Ok(false);
        }
        self.store.touch(&resolved.id, self.max_age).await
    }

    /// Destroy the context's session record. The transport keeps its
    /// identifier; the next write simply mints and re-issues a fresh one.
    pub async fn destroy<T: IdentifierTransport>(&self, ctx: &T) -> Result<(), SessionError> {
        let presented = ctx.signed_identifier();
        let resolved = self.resolve_identifier(presented.as_deref());
        if resolved.freshly_minted {
            return Ok(());
        }
        self.store.destroy(&resolved.id).await
    }

    /// Every live session. O(number of live sessions) — admin surface,
    /// not a request-path operation.
    pub async fn get_all_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        self.store.list_all().await
    }

    /// Drop every session. Same cost warning as [`Self::get_all_sessions`].
    pub async fn clear_all_sessions(&self) -> Result<(), SessionError> {
        self.store.clear().await
    }

    fn reissue<T: IdentifierTransport>(&self, ctx: &mut T, id: &str) {
        ctx.set_signed_identifier(identifier::sign(id, &self.secret));
    }
}
