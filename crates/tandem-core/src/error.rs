//! Error types for the Tandem coordination core.

use thiserror::Error;

/// A shared error type for the entire Tandem core.
///
/// Variants map one-to-one onto the error classes the coordination
/// workflows distinguish: caller mistakes (`Validation`, `NotFound`,
/// `Forbidden`, `Unauthorized`, `Conflict`), retryable storage failures
/// (`TransientStore`, `VersionConflict`), and collaborator failures
/// (`UploadFailed`, `Serialization`).
#[derive(Error, Debug, Clone)]
pub enum TandemError {
    /// Missing or malformed input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found, with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Caller is authenticated but not allowed to act on the entity
    /// (non-participant on a session, non-admin on a dispute mutation).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad or missing credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Booking overlap or other domain-level collision.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An attempted status transition outside the legal transition table.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Optimistic-concurrency write lost the race: the entity changed
    /// between read and conditional write. Retryable by re-reading.
    #[error("Version conflict on {entity_type} '{id}'")]
    VersionConflict {
        entity_type: &'static str,
        id: String,
    },

    /// Evidence upload to the object store failed.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Transient storage failure, retried with backoff at the operation
    /// boundary before being surfaced.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates an Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a VersionConflict error
    pub fn version_conflict(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::VersionConflict {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a TransientStore error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientStore(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a Conflict or InvalidTransition error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::InvalidTransition { .. })
    }

    /// Errors that a bounded retry loop is allowed to absorb.
    ///
    /// Version conflicts are retried immediately (re-read, recompute);
    /// transient store failures are retried with backoff. Everything
    /// else is surfaced to the caller untouched.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::TransientStore(_)
        )
    }
}

impl From<std::io::Error> for TandemError {
    fn from(err: std::io::Error) -> Self {
        Self::TransientStore(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for TandemError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for TandemError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for TandemError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, TandemError>`.
pub type Result<T> = std::result::Result<T, TandemError>;
