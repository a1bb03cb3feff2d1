//! Capability table describing which operations a backend implements.
//!
//! Each backend kind carries a fixed [`Capabilities`] value. The facade
//! consults it before dispatching administrative operations, so callers can
//! probe support with [`Capabilities::supports`] instead of catching errors.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Operations a backend may or may not implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Delete,
    Send,
    Receive,
    DeleteMessage,
    GetQueues,
    Count,
    IsExists,
}

impl Operation {
    /// Every operation, in table order
    pub const ALL: [Operation; 8] = [
        Operation::Create,
        Operation::Delete,
        Operation::Send,
        Operation::Receive,
        Operation::DeleteMessage,
        Operation::GetQueues,
        Operation::Count,
        Operation::IsExists,
    ];

    /// Canonical name used in capability maps
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Send => "send",
            Self::Receive => "receive",
            Self::DeleteMessage => "deleteMessage",
            Self::GetQueues => "getQueues",
            Self::Count => "count",
            Self::IsExists => "isExists",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ValidationError;

    /// Parse a canonical name; `createQueue` and `deleteQueue` are accepted
    /// as aliases for `create` and `delete`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" | "createQueue" => Ok(Self::Create),
            "delete" | "deleteQueue" => Ok(Self::Delete),
            "send" => Ok(Self::Send),
            "receive" => Ok(Self::Receive),
            "deleteMessage" => Ok(Self::DeleteMessage),
            "getQueues" => Ok(Self::GetQueues),
            "count" => Ok(Self::Count),
            "isExists" => Ok(Self::IsExists),
            other => Err(ValidationError::InvalidFormat {
                field: "operation".to_string(),
                message: format!("unknown operation '{other}'"),
            }),
        }
    }
}

/// Fixed per-backend table of supported operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub create: bool,
    pub delete: bool,
    pub send: bool,
    pub receive: bool,
    pub delete_message: bool,
    pub get_queues: bool,
    pub count: bool,
    pub is_exists: bool,
}

impl Capabilities {
    /// Everything supported
    pub const ALL: Capabilities = Capabilities {
        create: true,
        delete: true,
        send: true,
        receive: true,
        delete_message: true,
        get_queues: true,
        count: true,
        is_exists: true,
    };

    /// Check whether `operation` is supported
    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.create,
            Operation::Delete => self.delete,
            Operation::Send => self.send,
            Operation::Receive => self.receive,
            Operation::DeleteMessage => self.delete_message,
            Operation::GetQueues => self.get_queues,
            Operation::Count => self.count,
            Operation::IsExists => self.is_exists,
        }
    }

    /// Capability map keyed by canonical operation name
    pub fn to_map(&self) -> BTreeMap<&'static str, bool> {
        Operation::ALL
            .iter()
            .map(|op| (op.as_str(), self.supports(*op)))
            .collect()
    }
}

#[cfg(test)]
#[path = "capability_tests.rs"]
mod tests;
