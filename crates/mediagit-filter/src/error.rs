// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Error types for the filter pipeline

use thiserror::Error;

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Error types for filter registration, list building and application
///
/// "Passthrough" is deliberately absent: a filter declining to act is
/// reported through [`crate::CheckOutcome`] and [`crate::BufferOutcome`],
/// never as an error.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A filter is already registered under this name
    #[error("attempt to reregister existing filter '{0}'")]
    AlreadyExists(String),

    /// No filter is registered under this name
    #[error("cannot find filter '{0}'")]
    NotFound(String),

    /// The operation is not permitted (e.g. unregistering a built-in)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A filter declared an attribute requirement string that cannot be parsed
    #[error("invalid attribute requirement '{token}': {reason}")]
    InvalidAttributes {
        /// The offending requirement token
        token: String,
        /// Why it was rejected
        reason: String,
    },

    /// A filter's initialize hook failed
    #[error("failed to initialize filter '{name}': {reason}")]
    Initialize {
        /// Registered filter name
        name: String,
        /// Failure reported by the hook
        reason: String,
    },

    /// A line-ending conversion would not be reversible and `core.safecrlf` forbids it
    #[error("{message}{}", path.as_ref().map(|p| format!(" in '{}'", p)).unwrap_or_default())]
    UnsafeConversion {
        /// Path of the file being converted, when known
        path: Option<String>,
        /// Description of the lossy conversion
        message: String,
    },

    /// A stream was written to or closed after it had been closed
    #[error("write stream already closed")]
    StreamClosed,

    /// Attribute resolution failed for a reason other than "not found"
    #[error("attribute lookup failed: {0}")]
    Attribute(String),

    /// Object database failure
    #[error("object database error: {0}")]
    Object(String),

    /// Blob content cannot be addressed in memory
    #[error("blob is too large to filter ({0} bytes)")]
    BlobTooLarge(u64),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON configuration could not be parsed
    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl FilterError {
    /// Build an [`FilterError::InvalidAttributes`] error
    pub fn invalid_attributes(token: impl Into<String>, reason: impl Into<String>) -> Self {
        FilterError::InvalidAttributes {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`FilterError::UnsafeConversion`] error
    pub fn unsafe_conversion(path: Option<&str>, message: impl Into<String>) -> Self {
        FilterError::UnsafeConversion {
            path: path.filter(|p| !p.is_empty()).map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether this error is a registry "not found" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, FilterError::NotFound(_))
    }
}
