//! Engine error taxonomy.

use engage_store::StoreError;

use crate::sink::SinkError;

/// Errors returned by the engines. All are scoped to the failing call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A referenced container, discussion, post or vote is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is well-formed but not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Self-vote, non-starter helpful mark, missing capability.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Record store failure. Not retried here.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The event sink rejected an event. The write it describes has already
    /// been committed.
    #[error("event sink error: {0}")]
    Sink(#[from] SinkError),
}

impl EngineError {
    /// Short classification for log fields.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Store(_) => "store",
            Self::Sink(_) => "sink",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
