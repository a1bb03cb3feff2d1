//! Queue handle and the capability-checked facade over a backend.
//!
//! A [`Queue`] binds a queue name to a backend. Every call is checked
//! against the backend's capability table before it is dispatched; an
//! unsupported call fails with [`QueueError::UnsupportedOperation`] rather
//! than being silently downgraded. The one exception is queue deletion on a
//! backend that cannot delete, which counts as a successful no-op.
//!
//! After [`Queue::delete_queue`] the handle is rebound to the null backend,
//! so later calls on the same handle degrade to empty results instead of
//! failing.
//!
//! A handle can be turned into a [`QueueDescriptor`], which is plain data and
//! safe to persist. [`Queue::reconnect`] rebuilds a live handle from one.

use crate::backend::{connect, BackendConfig, BackendKind, QueueBackend};
use crate::backends::NullBackend;
use crate::batch::MessageBatch;
use crate::capability::{Capabilities, Operation};
use crate::error::QueueError;
use crate::message::{LeaseToken, MessageRecord, QueueName, VisibilityTimeout};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Receive Options
// ============================================================================

/// Options for a single receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to claim; zero probes without side effects
    pub max_messages: i64,
    /// Lease duration; the queue default when unset
    pub visibility_timeout: Option<VisibilityTimeout>,
}

impl ReceiveOptions {
    /// Create options claiming one message with the queue's default timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of messages
    pub fn with_max_messages(mut self, max_messages: i64) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Set lease duration for this receive
    pub fn with_visibility_timeout(mut self, timeout: VisibilityTimeout) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 1,
            visibility_timeout: None,
        }
    }
}

// ============================================================================
// Descriptor and Diagnostics
// ============================================================================

/// Persistable description of a queue handle; holds no live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub name: QueueName,
    pub default_timeout_seconds: u32,
    pub backend: BackendConfig,
}

impl QueueDescriptor {
    pub fn to_json(&self) -> Result<String, QueueError> {
        serde_json::to_string(self)
            .map_err(|e| QueueError::store("serialize_descriptor", e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, QueueError> {
        serde_json::from_str(json).map_err(|e| {
            QueueError::InvalidArgument(crate::error::ValidationError::InvalidFormat {
                field: "descriptor".to_string(),
                message: e.to_string(),
            })
        })
    }
}

/// Diagnostic snapshot of a queue handle.
///
/// Connection details are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub backend: BackendKind,
    /// `"yes"` or `"no"` per canonical operation name
    pub capabilities: BTreeMap<String, String>,
    pub queue: QueueName,
    pub default_timeout_seconds: u32,
    pub connection: String,
}

// ============================================================================
// Queue
// ============================================================================

/// Handle on one named queue
#[derive(Clone)]
pub struct Queue {
    backend: Arc<dyn QueueBackend>,
    name: QueueName,
    default_timeout: VisibilityTimeout,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("backend", &self.backend.kind())
            .field("name", &self.name)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Queue {
    /// Bind `name` on `backend`, creating the queue if the backend can.
    ///
    /// When `timeout` is `None` the stored queue default is used, falling
    /// back to [`VisibilityTimeout::DEFAULT_SECONDS`].
    pub async fn open(
        backend: Arc<dyn QueueBackend>,
        name: QueueName,
        timeout: Option<VisibilityTimeout>,
    ) -> Result<Self, QueueError> {
        let capabilities = backend.capabilities();

        if capabilities.supports(Operation::Create) && !backend.is_exists(&name).await? {
            let create_timeout = timeout.unwrap_or_default();
            if backend.create_queue(&name, create_timeout).await? {
                info!(queue = %name, backend = %backend.kind(), "Created queue on bind");
            }
        }

        let default_timeout = match timeout {
            Some(timeout) => timeout,
            None => backend
                .queue_record(&name)
                .await?
                .map(|record| record.default_timeout())
                .unwrap_or_default(),
        };

        Ok(Self {
            backend,
            name,
            default_timeout,
        })
    }

    /// Rebuild a live handle from a persisted descriptor
    pub async fn reconnect(descriptor: &QueueDescriptor) -> Result<Self, QueueError> {
        let backend = connect(&descriptor.backend).await?;
        let timeout =
            VisibilityTimeout::from_secs(i64::from(descriptor.default_timeout_seconds))?;
        Self::open(backend, descriptor.name.clone(), Some(timeout)).await
    }

    /// Data needed to rebuild this handle later
    pub fn descriptor(&self) -> QueueDescriptor {
        QueueDescriptor {
            name: self.name.clone(),
            default_timeout_seconds: self.default_timeout.whole_seconds(),
            backend: self.backend.config(),
        }
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn default_timeout(&self) -> VisibilityTimeout {
        self.default_timeout
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Fixed capability table of the bound backend
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Check support by operation name, accepting the facade aliases.
    ///
    /// Unknown names are reported as unsupported.
    pub fn is_supported(&self, operation: &str) -> bool {
        operation
            .parse::<Operation>()
            .map(|op| self.capabilities().supports(op))
            .unwrap_or(false)
    }

    fn require(&self, operation: Operation) -> Result<(), QueueError> {
        if self.capabilities().supports(operation) {
            Ok(())
        } else {
            Err(QueueError::UnsupportedOperation {
                operation,
                backend: self.backend.kind(),
            })
        }
    }

    /// Create another queue on the same backend; `Ok(false)` if it exists
    pub async fn create_queue(
        &self,
        name: &QueueName,
        timeout: Option<VisibilityTimeout>,
    ) -> Result<bool, QueueError> {
        self.require(Operation::Create)?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        self.backend.create_queue(name, timeout).await
    }

    /// Delete this queue and every message in it.
    ///
    /// The handle is rebound to the null backend whether or not the store
    /// supports deletion.
    pub async fn delete_queue(&mut self) -> Result<bool, QueueError> {
        let deleted = if self.capabilities().supports(Operation::Delete) {
            self.backend.delete_queue(&self.name).await?
        } else {
            true
        };

        info!(queue = %self.name, deleted, "Queue handle rebound to null backend");
        self.backend = Arc::new(NullBackend::new());
        Ok(deleted)
    }

    /// Append a message to this queue
    pub async fn send(&self, body: impl Into<Bytes>) -> Result<MessageRecord, QueueError> {
        self.require(Operation::Send)?;
        self.backend.send(&self.name, body.into()).await
    }

    /// Claim up to `options.max_messages` messages
    pub async fn receive(&self, options: ReceiveOptions) -> Result<MessageBatch, QueueError> {
        self.require(Operation::Receive)?;
        let timeout = options.visibility_timeout.unwrap_or(self.default_timeout);

        let messages = self
            .backend
            .claim(&self.name, options.max_messages, timeout)
            .await?;

        debug!(
            queue = %self.name,
            requested = options.max_messages,
            received = messages.len(),
            "Receive completed"
        );
        Ok(MessageBatch::new(self.name.clone(), messages))
    }

    /// Acknowledge a message; `Ok(false)` when the token matches nothing
    pub async fn delete_message(&self, token: &LeaseToken) -> Result<bool, QueueError> {
        self.require(Operation::DeleteMessage)?;
        self.backend.delete_message(token).await
    }

    /// Messages in this queue, leased or not
    pub async fn count(&self) -> Result<u64, QueueError> {
        self.require(Operation::Count)?;
        self.backend.count(&self.name).await
    }

    pub async fn is_exists(&self, name: &QueueName) -> Result<bool, QueueError> {
        self.require(Operation::IsExists)?;
        self.backend.is_exists(name).await
    }

    pub async fn get_queues(&self) -> Result<BTreeSet<QueueName>, QueueError> {
        self.require(Operation::GetQueues)?;
        self.backend.get_queues().await
    }

    pub fn debug_info(&self) -> DebugInfo {
        let capabilities = self
            .capabilities()
            .to_map()
            .into_iter()
            .map(|(op, supported)| {
                let flag = if supported { "yes" } else { "no" };
                (op.to_string(), flag.to_string())
            })
            .collect();

        DebugInfo {
            backend: self.backend.kind(),
            capabilities,
            queue: self.name.clone(),
            default_timeout_seconds: self.default_timeout.whole_seconds(),
            connection: "[hidden]".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
