//! Shared Error Types
//!
//! Errors raised by the pure domain rules in `shared`. These never involve
//! I/O: they are produced before a mutation touches the cache, the offline
//! queue or the backend.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `ValidationError` - A request violates an entity rule
//! - `NotFound` - A referenced entity or option does not exist
//!
//! # Usage
//!
//! ```rust
//! use tripsync::shared::error::SharedError;
//!
//! let error = SharedError::validation("option_ids", "This poll only allows one option");
//! assert!(error.to_string().contains("only allows one option"));
//! ```
use thiserror::Error;

/// Shared error types raised by domain rules
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. "poll" or "option"
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
