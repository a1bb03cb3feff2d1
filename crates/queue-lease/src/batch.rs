//! Result of a single receive call.
//!
//! A [`MessageBatch`] is captured once, when the claim commits, and is never
//! refreshed afterwards. Iterating it again walks the same snapshot; it does
//! not re-query the store, so leases that expire or messages deleted by other
//! consumers after the claim are not reflected here.

use crate::message::{LeaseToken, MessageRecord, QueueName};
use serde::{Deserialize, Serialize};

/// Finite, ordered snapshot of claimed messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    queue: QueueName,
    messages: Vec<MessageRecord>,
}

impl MessageBatch {
    pub fn new(queue: QueueName, messages: Vec<MessageRecord>) -> Self {
        Self { queue, messages }
    }

    /// Empty batch for `queue`
    pub fn empty(queue: QueueName) -> Self {
        Self::new(queue, Vec::new())
    }

    /// Queue the messages were claimed from
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MessageRecord> {
        self.messages.get(index)
    }

    pub fn first(&self) -> Option<&MessageRecord> {
        self.messages.first()
    }

    /// Iterate the captured snapshot; may be called any number of times
    pub fn iter(&self) -> std::slice::Iter<'_, MessageRecord> {
        self.messages.iter()
    }

    /// Tokens needed to acknowledge every message in the batch
    pub fn lease_tokens(&self) -> Vec<LeaseToken> {
        self.messages
            .iter()
            .filter_map(|m| m.lease_token.clone())
            .collect()
    }

    pub fn into_messages(self) -> Vec<MessageRecord> {
        self.messages
    }
}

impl IntoIterator for MessageBatch {
    type Item = MessageRecord;
    type IntoIter = std::vec::IntoIter<MessageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageBatch {
    type Item = &'a MessageRecord;
    type IntoIter = std::slice::Iter<'a, MessageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
