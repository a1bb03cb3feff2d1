//! Backend contract, backend kinds and the factory that builds them.
//!
//! A [`QueueBackend`] owns the lease protocol for one backing store:
//!
//! 1. `claim` selects claimable rows (`lease_token IS NULL OR lease_expires_at < now`)
//!    and leases each one with a conditional update that re-checks the same
//!    predicate, inside one unit of work.
//! 2. Rows that lost the race to another claimer are skipped, not reported.
//! 3. `delete_message` removes whichever row currently holds the token.
//!
//! Lease expiry is evaluated lazily by the next `claim`; no backend runs a
//! background sweeper. Claim order is unspecified: no FIFO or priority
//! guarantee is made by any backend.

use crate::backends::{InMemoryBackend, NullBackend, SqliteBackend};
use crate::capability::Capabilities;
use crate::error::{ConfigurationError, QueueError, ValidationError};
use crate::message::{LeaseToken, MessageRecord, QueueName, QueueRecord, VisibilityTimeout};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Default time a SQLite connection waits on a locked database
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Enumeration of supported backing stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Sqlite,
    InMemory,
    Null,
}

impl BackendKind {
    /// Fixed capability table for each backend kind
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Sqlite => Capabilities::ALL,
            Self::InMemory => Capabilities::ALL,
            Self::Null => Capabilities {
                create: false,
                delete: false,
                send: true,
                receive: true,
                delete_message: true,
                get_queues: false,
                count: false,
                is_exists: true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::InMemory => "in_memory",
            Self::Null => "null",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable description of how to build a backend.
///
/// This is pure data: it never holds a live connection, so it can be
/// persisted and later handed to [`connect`] to re-establish one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
    InMemory,
    Null,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl BackendConfig {
    /// SQLite configuration with the default busy timeout
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::Sqlite {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite { .. } => BackendKind::Sqlite,
            Self::InMemory => BackendKind::InMemory,
            Self::Null => BackendKind::Null,
        }
    }

    /// Fail fast on settings that can never produce a working backend
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Self::Sqlite { path, .. } = self {
            if path.as_os_str().is_empty() {
                return Err(ConfigurationError::Missing {
                    key: "backend.path".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Interface implemented by every backing store
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Get backend kind
    fn kind(&self) -> BackendKind;

    /// Get the fixed capability table
    fn capabilities(&self) -> Capabilities {
        self.kind().capabilities()
    }

    /// Get the data needed to rebuild an equivalent backend
    fn config(&self) -> BackendConfig;

    /// Create a queue; `Ok(false)` when the name is already taken
    async fn create_queue(
        &self,
        name: &QueueName,
        default_timeout: VisibilityTimeout,
    ) -> Result<bool, QueueError>;

    /// Delete a queue and every message in it; `Ok(false)` when absent
    async fn delete_queue(&self, name: &QueueName) -> Result<bool, QueueError>;

    /// Look up a queue record
    async fn queue_record(&self, name: &QueueName) -> Result<Option<QueueRecord>, QueueError>;

    /// Check whether a queue exists
    async fn is_exists(&self, name: &QueueName) -> Result<bool, QueueError>;

    /// List every queue name
    async fn get_queues(&self) -> Result<BTreeSet<QueueName>, QueueError>;

    /// Count messages in a queue, leased or not
    async fn count(&self, name: &QueueName) -> Result<u64, QueueError>;

    /// Insert an unleased message
    async fn send(&self, name: &QueueName, body: Bytes) -> Result<MessageRecord, QueueError>;

    /// Lease up to `max_messages` claimable messages for `timeout`.
    ///
    /// `max_messages == 0` returns an empty result without touching the
    /// store; a negative value is an invalid argument.
    async fn claim(
        &self,
        name: &QueueName,
        max_messages: i64,
        timeout: VisibilityTimeout,
    ) -> Result<Vec<MessageRecord>, QueueError>;

    /// Delete the message holding `token`; `Ok(false)` when no row matches
    async fn delete_message(&self, token: &LeaseToken) -> Result<bool, QueueError>;
}

/// Build a backend from configuration
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn QueueBackend>, QueueError> {
    config.validate()?;

    let backend: Arc<dyn QueueBackend> = match config {
        BackendConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => Arc::new(SqliteBackend::open(path.clone(), *busy_timeout_ms).await?),
        BackendConfig::InMemory => Arc::new(InMemoryBackend::default()),
        BackendConfig::Null => Arc::new(NullBackend::new()),
    };

    Ok(backend)
}

/// Validate a requested batch size
pub fn validate_max_messages(max_messages: i64) -> Result<usize, QueueError> {
    usize::try_from(max_messages).map_err(|_| {
        QueueError::InvalidArgument(ValidationError::OutOfRange {
            field: "max_messages".to_string(),
            message: format!("must not be negative, got {max_messages}"),
        })
    })
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
