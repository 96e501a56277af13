//! Error types for the catalog reconciler.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, query construction, catalog transport, planning and
//! plan execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the catalog reconciler.
#[derive(Debug, Error)]
pub enum CatalogSyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote catalog errors.
    #[error("Catalog error: {0}")]
    Remote(#[from] RemoteError),

    /// Query snippet errors.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Remote catalog errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Authentication failed.
    #[error("Catalog authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Catalog request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The catalog rejected a statement of a submitted transaction.
    #[error("Catalog rejected the transaction: {message}")]
    Conflict {
        /// Index of the rejected statement within the transaction, if known.
        index: Option<usize>,
        /// Rejection reason reported by the catalog.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with the catalog: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from the catalog: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised while parsing query snippets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The snippet is not well formed.
    #[error("Invalid snippet at offset {offset}: {message}")]
    Syntax {
        /// Byte offset of the offending token.
        offset: usize,
        /// What was expected.
        message: String,
    },

    /// A reference call has the wrong shape, e.g. `Role(1)`.
    #[error("Invalid reference `{call}`: {message}")]
    InvalidReference {
        /// The reference constructor name.
        call: String,
        /// Why the reference is invalid.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A snippet-valued attribute could not be parsed.
    #[error("Invalid snippet in {kind} '{name}' field `{field}`: {source}")]
    InvalidSnippet {
        /// Kind of the object.
        kind: String,
        /// Name of the object.
        name: String,
        /// Attribute holding the snippet.
        field: String,
        /// Underlying parse error.
        source: QueryError,
    },

    /// Attributes do not have the expected shape.
    #[error("Invalid attributes for {kind} '{name}': {message}")]
    InvalidAttributes {
        /// Kind of the object.
        kind: String,
        /// Name of the object.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The catalog rejected the operation for a specific object.
    #[error("Failed to {action} {resource_type} '{name}': {reason}")]
    OperationRejected {
        /// Operation that was rejected (create, update, delete).
        action: String,
        /// Kind of the object.
        resource_type: String,
        /// Name of the object.
        name: String,
        /// Reason for the rejection.
        reason: String,
    },

    /// A stepwise run failed after some steps had already been committed.
    #[error(
        "Step '{step}' failed after {committed} of {total} steps were committed; \
         the catalog is partially applied: {reason}"
    )]
    PartiallyApplied {
        /// Step that failed.
        step: String,
        /// Number of steps committed before the failure.
        committed: usize,
        /// Total number of non-empty steps.
        total: usize,
        /// Underlying failure.
        reason: String,
    },
}

/// Result type alias for catalog reconciler operations.
pub type Result<T> = std::result::Result<T, CatalogSyncError>;

impl CatalogSyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error comes from the transport layer.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Remote(
                RemoteError::NetworkError { .. } | RemoteError::AuthenticationFailed { .. }
            )
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl QueryError {
    /// Creates a syntax error at the given offset.
    #[must_use]
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }
}
