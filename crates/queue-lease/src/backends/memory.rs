//! In-memory backend for testing and single-process use.
//!
//! This module provides a fully functional in-memory lease store that:
//! - Implements visibility-timeout leasing with lazy expiry
//! - Cascades message deletion when a queue is deleted
//! - Provides thread-safe concurrent access
//!
//! The write lock on the shared storage is the unit of work: a claim selects
//! and leases its rows while holding it, so two claimers can never both lease
//! the same message. Lease expiry is evaluated against an injectable
//! [`Clock`], which lets tests step time instead of sleeping.

use crate::backend::{validate_max_messages, BackendConfig, BackendKind, QueueBackend};
use crate::clock::{Clock, SystemClock};
use crate::error::QueueError;
use crate::message::{
    Checksum, LeaseToken, MessageId, MessageRecord, QueueId, QueueName, QueueRecord,
    VisibilityTimeout,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
#[derive(Default)]
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    next_queue_id: i64,
    next_message_id: i64,
}

impl QueueStorage {
    fn queue(&self, name: &QueueName) -> Result<&InMemoryQueue, QueueError> {
        self.queues.get(name).ok_or_else(|| QueueError::QueueNotFound {
            queue_name: name.to_string(),
        })
    }

    fn queue_mut(&mut self, name: &QueueName) -> Result<&mut InMemoryQueue, QueueError> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }
}

/// Internal state for a single queue
struct InMemoryQueue {
    record: QueueRecord,
    /// Messages keyed by id
    messages: BTreeMap<MessageId, MessageRecord>,
}

// ============================================================================
// InMemoryBackend
// ============================================================================

/// In-memory backend implementation.
///
/// Cloning creates a new handle to the **same** underlying storage.
#[derive(Clone)]
pub struct InMemoryBackend {
    storage: Arc<RwLock<QueueStorage>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBackend {
    /// Create an empty backend using the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty backend evaluating lease expiry against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage {
                next_queue_id: 1,
                next_message_id: 1,
                ..QueueStorage::default()
            })),
            clock,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| {
            warn!("In-memory storage lock poisoned");
            QueueError::store("read", "in-memory storage lock poisoned")
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| {
            warn!("In-memory storage lock poisoned");
            QueueError::store("write", "in-memory storage lock poisoned")
        })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    fn config(&self) -> BackendConfig {
        BackendConfig::InMemory
    }

    async fn create_queue(
        &self,
        name: &QueueName,
        default_timeout: VisibilityTimeout,
    ) -> Result<bool, QueueError> {
        let mut storage = self.write()?;
        if storage.queues.contains_key(name) {
            return Ok(false);
        }

        let id = QueueId::new(storage.next_queue_id);
        storage.next_queue_id += 1;
        storage.queues.insert(
            name.clone(),
            InMemoryQueue {
                record: QueueRecord {
                    id,
                    name: name.clone(),
                    default_timeout_seconds: default_timeout.whole_seconds(),
                },
                messages: BTreeMap::new(),
            },
        );

        info!(queue = %name, queue_id = %id, "Created queue");
        Ok(true)
    }

    async fn delete_queue(&self, name: &QueueName) -> Result<bool, QueueError> {
        let removed = self.write()?.queues.remove(name);
        match removed {
            Some(queue) => {
                info!(
                    queue = %name,
                    messages = queue.messages.len(),
                    "Deleted queue and its messages"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn queue_record(&self, name: &QueueName) -> Result<Option<QueueRecord>, QueueError> {
        Ok(self.read()?.queues.get(name).map(|q| q.record.clone()))
    }

    async fn is_exists(&self, name: &QueueName) -> Result<bool, QueueError> {
        Ok(self.read()?.queues.contains_key(name))
    }

    async fn get_queues(&self) -> Result<BTreeSet<QueueName>, QueueError> {
        Ok(self.read()?.queues.keys().cloned().collect())
    }

    async fn count(&self, name: &QueueName) -> Result<u64, QueueError> {
        let storage = self.read()?;
        let count = storage.queue(name)?.messages.len() as u64;
        Ok(count)
    }

    async fn send(&self, name: &QueueName, body: Bytes) -> Result<MessageRecord, QueueError> {
        let now = self.clock.now();
        let mut storage = self.write()?;

        let id = MessageId::new(storage.next_message_id);
        let queue = storage.queue_mut(name)?;
        let record = MessageRecord {
            id,
            queue_id: queue.record.id,
            checksum: Checksum::compute(&body),
            body,
            created_at: now,
            lease_token: None,
            lease_expires_at: None,
        };
        queue.messages.insert(id, record.clone());
        storage.next_message_id += 1;

        debug!(queue = %name, message_id = %id, "Message sent");
        Ok(record)
    }

    async fn claim(
        &self,
        name: &QueueName,
        max_messages: i64,
        timeout: VisibilityTimeout,
    ) -> Result<Vec<MessageRecord>, QueueError> {
        let max_messages = validate_max_messages(max_messages)?;
        if max_messages == 0 {
            return Ok(Vec::new());
        }

        let mut storage = self.write()?;
        let now = self.clock.now();
        let expires_at = now.plus(timeout.as_duration());
        let queue = storage.queue_mut(name)?;

        let selected: Vec<MessageId> = queue
            .messages
            .values()
            .filter(|m| m.is_claimable_at(now))
            .map(|m| m.id)
            .take(max_messages)
            .collect();

        // The write guard excludes every other claimer until the leases are set
        let mut claimed = Vec::with_capacity(selected.len());
        for id in selected {
            let Some(message) = queue.messages.get_mut(&id) else {
                continue;
            };
            message.lease_token = Some(LeaseToken::generate());
            message.lease_expires_at = Some(expires_at);
            claimed.push(message.clone());
        }

        debug!(queue = %name, claimed = claimed.len(), "Claimed messages");
        Ok(claimed)
    }

    async fn delete_message(&self, token: &LeaseToken) -> Result<bool, QueueError> {
        let mut storage = self.write()?;
        for queue in storage.queues.values_mut() {
            let found = queue
                .messages
                .values()
                .find(|m| m.lease_token.as_ref() == Some(token))
                .map(|m| m.id);

            if let Some(id) = found {
                queue.messages.remove(&id);
                debug!(message_id = %id, "Message deleted");
                return Ok(true);
            }
        }

        Ok(false)
    }
}
