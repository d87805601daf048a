//! Shared Error Types
//!
//! This module defines the error taxonomy used across the synchronization core.
//! Every fallible operation returns a [`SyncError`]; none of them panic the host.
//!
//! # Error Categories
//!
//! - `Transport` - Connection dropped or could not be opened (recovered by backoff)
//! - `AuthRejected` - The server refused the bearer credential (terminal)
//! - `Persist` - A remote write failed (surfaced, never retried automatically)
//! - `Validation` - A structural operation was rejected before any network call
//! - `StaleReference` - The id is no longer known locally (no-op + warning)
//! - `Serialization` - JSON on the wire could not be encoded or decoded
//!
//! # Usage
//!
//! ```rust
//! use notesync::shared::error::SyncError;
//!
//! let error = SyncError::validation("parentId", "target is a descendant of the section");
//! assert!(error.is_validation());
//! ```
use thiserror::Error;

/// Errors produced by the synchronization core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Connection-level failure
    #[error("Transport error: {message}")]
    Transport {
        /// Human-readable error message
        message: String,
    },

    /// The server rejected the credential; the connection will not be retried
    #[error("Authentication rejected: {message}")]
    AuthRejected {
        /// Reason reported by the server
        message: String,
    },

    /// A remote write failed
    #[error("Persist failed for {resource}: {message}")]
    Persist {
        /// Resource the write targeted (e.g. `note:<id>`)
        resource: String,
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// The referenced entity is not (or no longer) present locally
    #[error("Stale reference: {id}")]
    StaleReference {
        /// The id that could not be resolved
        id: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth_rejected(message: impl Into<String>) -> Self {
        Self::AuthRejected {
            message: message.into(),
        }
    }

    /// Create a new persist error
    pub fn persist(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persist {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new stale reference error
    pub fn stale(id: impl ToString) -> Self {
        Self::StaleReference { id: id.to_string() }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleReference { .. })
    }

    /// Whether a reconnect attempt can possibly succeed after this error
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::serialization(format!("Failed to parse response: {}", err))
        } else {
            Self::transport(format!("Network error: {}", err))
        }
    }
}

/// Convenience alias used throughout the crate
pub type SyncResult<T> = Result<T, SyncError>;
