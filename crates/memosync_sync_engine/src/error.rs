//! Error types for the sync engine.

use crate::conflict::SyncConflict;
use memosync_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Longest response excerpt kept in an error message.
const MAX_BODY_EXCERPT: usize = 200;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Provider settings are missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The backend rejected the credentials.
    #[error("authentication failed ({status}): {message}")]
    AuthenticationFailed {
        /// HTTP status.
        status: u16,
        /// Response excerpt.
        message: String,
    },

    /// The backend failed internally.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Response excerpt.
        message: String,
    },

    /// Any other non-success response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Response excerpt.
        message: String,
    },

    /// A conditional write was rejected because the remote document moved.
    #[error("remote document changed since it was read: {0}")]
    RemoteChanged(String),

    /// The backend returned something that could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The cloud snapshot is newer than this device's last sync.
    ///
    /// Not a failure: the caller must pick a side with
    /// `SyncOrchestrator::resolve_conflict`.
    #[error("sync conflict: cloud snapshot is newer than last sync")]
    Conflict(Box<SyncConflict>),

    /// Another sync pass holds the engine.
    #[error("a sync pass is already in progress")]
    Busy,

    /// Persisted sync state could not be read or written.
    #[error("sync state error: {0}")]
    State(String),

    /// Local store, snapshot or crypto error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates a sync state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = excerpt(body);
        match status {
            401 | 403 => Self::AuthenticationFailed { status, message },
            500..=599 => Self::ServerError { status, message },
            _ => Self::Api { status, message },
        }
    }

    /// Returns true if the caller may reasonably retry.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::ServerError { .. } | SyncError::Busy
        )
    }

    /// Returns the conflict payload, if this is a conflict.
    pub fn as_conflict(&self) -> Option<&SyncConflict> {
        match self {
            SyncError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    /// Consumes the error, returning the conflict payload if there is one.
    pub fn into_conflict(self) -> Option<SyncConflict> {
        match self {
            SyncError::Conflict(conflict) => Some(*conflict),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() <= MAX_BODY_EXCERPT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_BODY_EXCERPT).collect();
        format!("{cut}...")
    }
}
