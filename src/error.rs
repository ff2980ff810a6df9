use thiserror::Error;

/// Failures surfaced by the session engine.
///
/// "Absent or expired" is deliberately not represented here: `get` and
/// `touch` report it through their return values, and `destroy` of a
/// missing record succeeds.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A presented identifier could not even be parsed: missing separator,
    /// empty id, wrong signature length or charset, or an id that is unsafe
    /// to map onto a file path. Detected before any MAC comparison.
    #[error("malformed session identifier")]
    MalformedIdentifier,

    /// A well-formed signed identifier whose signature did not verify
    /// against the configured secret.
    #[error("session identifier signature did not verify")]
    InvalidSignature,

    /// The underlying storage medium failed (unreadable directory,
    /// unwritable file, serialization failure on the write path).
    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),

    /// An invalid option caught at construction time. Fatal to startup.
    #[error("invalid session configuration: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(error: serde_json::Error) -> Self {
        SessionError::StoreUnavailable(error.into())
    }
}
