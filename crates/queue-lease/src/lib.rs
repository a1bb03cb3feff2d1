//! # Queue Lease
//!
//! Lease-based message queue facade over interchangeable backing stores.
//!
//! Independent consumers claim messages from a shared store without any
//! coordinator. A claim leases each message for a visibility timeout; the
//! consumer acknowledges it by deleting with the lease token, or the lease
//! lapses and the message becomes claimable again. Delivery is
//! at-least-once and no ordering is guaranteed.
//!
//! ## Module Organization
//!
//! - [`message`] - Queue and message records, identifiers and lease tokens
//! - [`capability`] - Fixed per-backend capability tables
//! - [`backend`] - The backend contract, backend kinds and the factory
//! - [`backends`] - SQLite, in-memory and null backends
//! - [`queue`] - Capability-checked queue handle
//! - [`batch`] - Snapshot of messages returned by a receive
//! - [`config`] - Layered client configuration
//! - [`error`] - Error types for all queue operations
//!
//! ## Example
//!
//! ```no_run
//! use queue_lease::{connect, BackendConfig, Queue, QueueName, ReceiveOptions};
//!
//! # async fn example() -> Result<(), queue_lease::QueueError> {
//! let backend = connect(&BackendConfig::sqlite("/var/lib/queue.db")).await?;
//! let queue = Queue::open(backend, QueueName::new("orders".to_string())?, None).await?;
//!
//! queue.send("hello").await?;
//! for message in queue.receive(ReceiveOptions::new().with_max_messages(10)).await? {
//!     // process, then acknowledge
//!     if let Some(token) = &message.lease_token {
//!         queue.delete_message(token).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod backend;
pub mod backends;
pub mod batch;
pub mod capability;
pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types at crate root for convenience
pub use backend::{connect, BackendConfig, BackendKind, QueueBackend};
pub use backends::{InMemoryBackend, NullBackend, SqliteBackend};
pub use batch::MessageBatch;
pub use capability::{Capabilities, Operation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, LoggingConfig, QueueSettings};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{
    Checksum, LeaseToken, MessageId, MessageRecord, QueueId, QueueName, QueueRecord, Timestamp,
    VisibilityTimeout,
};
pub use queue::{DebugInfo, Queue, QueueDescriptor, ReceiveOptions};
