//! Null backend.
//!
//! Stands in for a queue handle whose queue has been deleted. It stores
//! nothing: receives come back empty, acknowledgements match nothing and no
//! queue ever exists. Queue management operations are reported as
//! unsupported through its capability table.

use crate::backend::{validate_max_messages, BackendConfig, BackendKind, QueueBackend};
use crate::capability::Operation;
use crate::error::QueueError;
use crate::message::{LeaseToken, MessageRecord, QueueName, QueueRecord, VisibilityTimeout};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use tracing::debug;

#[cfg(test)]
#[path = "null_tests.rs"]
mod tests;

/// Backend that holds no queues and no messages
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(operation: Operation) -> QueueError {
        QueueError::UnsupportedOperation {
            operation,
            backend: BackendKind::Null,
        }
    }
}

#[async_trait]
impl QueueBackend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn config(&self) -> BackendConfig {
        BackendConfig::Null
    }

    async fn create_queue(
        &self,
        _name: &QueueName,
        _default_timeout: VisibilityTimeout,
    ) -> Result<bool, QueueError> {
        Err(Self::unsupported(Operation::Create))
    }

    async fn delete_queue(&self, _name: &QueueName) -> Result<bool, QueueError> {
        Err(Self::unsupported(Operation::Delete))
    }

    async fn queue_record(&self, _name: &QueueName) -> Result<Option<QueueRecord>, QueueError> {
        Ok(None)
    }

    async fn is_exists(&self, _name: &QueueName) -> Result<bool, QueueError> {
        Ok(false)
    }

    async fn get_queues(&self) -> Result<BTreeSet<QueueName>, QueueError> {
        Err(Self::unsupported(Operation::GetQueues))
    }

    async fn count(&self, _name: &QueueName) -> Result<u64, QueueError> {
        Err(Self::unsupported(Operation::Count))
    }

    async fn send(&self, name: &QueueName, _body: Bytes) -> Result<MessageRecord, QueueError> {
        debug!(queue = %name, "Send to null backend");
        Err(QueueError::QueueNotFound {
            queue_name: name.to_string(),
        })
    }

    async fn claim(
        &self,
        _name: &QueueName,
        max_messages: i64,
        _timeout: VisibilityTimeout,
    ) -> Result<Vec<MessageRecord>, QueueError> {
        validate_max_messages(max_messages)?;
        Ok(Vec::new())
    }

    async fn delete_message(&self, _token: &LeaseToken) -> Result<bool, QueueError> {
        Ok(false)
    }
}
