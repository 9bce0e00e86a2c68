//! Error types for memosync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in memosync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The local entity store rejected an operation.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    ///
    /// Deliberately carries no detail: a wrong password and a corrupted
    /// payload are indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A snapshot could not be interpreted.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },

    /// A history snapshot with the given id does not exist.
    #[error("history snapshot not found: {id}")]
    HistoryNotFound {
        /// The requested snapshot id.
        id: String,
    },
}

impl CoreError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates the opaque decryption failed error.
    pub fn decryption_failed() -> Self {
        Self::DecryptionFailed
    }

    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Creates a history not found error.
    pub fn history_not_found(id: impl Into<String>) -> Self {
        Self::HistoryNotFound { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_error_has_no_detail() {
        assert_eq!(CoreError::decryption_failed().to_string(), "decryption failed");
    }

    #[test]
    fn error_display() {
        let err = CoreError::history_not_found("abc");
        assert!(err.to_string().contains("abc"));

        let err = CoreError::storage("disk full");
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
