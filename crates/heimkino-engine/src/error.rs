use std::io;
use std::path::PathBuf;
use std::time::Duration;

use heimkino_core::ValidationError;
use thiserror::Error;

/// Why a snapshot could not be saved or loaded. A failed load never touches
/// the model that was active before.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Wrong format tag, unknown version or malformed document.
    #[error("unreadable snapshot: {reason}")]
    Unreadable { reason: String },
    /// The document is well formed but names actions or states this build
    /// does not know.
    #[error("snapshot schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The operation may or may not have completed.
    #[error("snapshot I/O did not finish within {0:?}")]
    Timeout(Duration),
}

impl PersistError {
    pub(crate) fn unreadable(reason: impl Into<String>) -> Self {
        Self::Unreadable {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot {event} while {from}")]
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },
    #[error("unknown content id {0:?}")]
    UnknownContent(String),
    #[error("feedback for {got:?} but the active session plays {expected:?}")]
    SessionMismatch { expected: String, got: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
