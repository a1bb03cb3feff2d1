//! Backend implementations.
//!
//! This module contains concrete implementations of the `QueueBackend`
//! trait for the supported backing stores.

pub mod memory;
pub mod null;
pub mod sqlite;

pub use memory::InMemoryBackend;
pub use null::NullBackend;
pub use sqlite::SqliteBackend;
