//! Client configuration.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!
//! 1. Built-in defaults (in-memory backend, queue `default`)
//! 2. An optional configuration file; TOML, YAML or JSON by extension
//! 3. Environment variables prefixed `QUEUE_LEASE__` with `__` between keys,
//!    e.g. `QUEUE_LEASE__BACKEND__PATH=/var/lib/queue.db`

use crate::backend::{connect, BackendConfig};
use crate::capability::Operation;
use crate::error::{ConfigurationError, QueueError};
use crate::message::{QueueName, VisibilityTimeout};
use crate::queue::Queue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "QUEUE_LEASE";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub queue: QueueSettings,
    pub logging: LoggingConfig,
}

/// Queue the client binds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub name: String,
    /// Default timeout given to the queue if binding creates it. An existing
    /// queue keeps its stored default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_seconds: Option<u32>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            default_timeout_seconds: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ClientConfig {
    /// Load from an optional file and the process environment
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::from_sources(file, None)
    }

    /// Load from an optional file and an explicit environment map.
    ///
    /// `None` reads the process environment.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigurationError::Missing {
                    key: format!("config file {}", path.display()),
                });
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Fail fast on settings that cannot produce a working queue
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.backend.validate()?;
        self.queue_name()?;
        self.default_timeout()?;
        Ok(())
    }

    pub fn queue_name(&self) -> Result<QueueName, ConfigurationError> {
        QueueName::new(self.queue.name.clone()).map_err(|e| ConfigurationError::Invalid {
            message: format!("queue.name: {e}"),
        })
    }

    /// Configured creation timeout, if any
    pub fn default_timeout(&self) -> Result<Option<VisibilityTimeout>, ConfigurationError> {
        self.queue
            .default_timeout_seconds
            .map(|seconds| {
                VisibilityTimeout::from_secs(i64::from(seconds)).map_err(|e| {
                    ConfigurationError::Invalid {
                        message: format!("queue.default_timeout_seconds: {e}"),
                    }
                })
            })
            .transpose()
    }

    /// Validate, connect and bind the configured queue.
    ///
    /// The handle's default timeout is the one stored with the queue.
    pub async fn open_queue(&self) -> Result<Queue, QueueError> {
        self.validate()?;
        let backend = connect(&self.backend).await?;
        let name = self.queue_name()?;

        if let Some(timeout) = self.default_timeout()? {
            if backend.capabilities().supports(Operation::Create)
                && !backend.is_exists(&name).await?
            {
                backend.create_queue(&name, timeout).await?;
            }
        }

        Queue::open(backend, name, None).await
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
