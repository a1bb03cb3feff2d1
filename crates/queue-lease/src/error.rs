//! Error types for queue operations.

use crate::backend::BackendKind;
use crate::capability::Operation;
use chrono::Duration;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: Operation,
        backend: BackendKind,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Store error during {operation}: {message}")]
    Store { operation: String, message: String },
}

impl QueueError {
    /// Create a store error for the named operation.
    pub fn store(operation: &str, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Check if error is transient and the whole operation may be retried.
    ///
    /// Store failures roll back before surfacing, so retrying them cannot
    /// leave partial leases behind.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::ConnectionFailed { .. } => true,
            Self::UnsupportedOperation { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::InvalidArgument(_) => false,
            Self::Store { .. } => true,
        }
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ConnectionFailed { .. } => Some(Duration::seconds(5)),
            Self::Store { .. } => Some(Duration::seconds(1)),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parsing {
            message: err.to_string(),
        }
    }
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
