//! Common test utilities for queue-lease integration tests
//!
//! Each helper opens its own `SqliteBackend`, which owns a separate
//! connection to the shared database file. That is how independent
//! consumer processes see the store.

use queue_lease::{QueueBackend, QueueName, SqliteBackend, VisibilityTimeout};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary database shared by several independent connections
pub struct SharedDatabase {
    // Held so the directory outlives the test
    _dir: TempDir,
    pub path: PathBuf,
}

impl SharedDatabase {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        Self { _dir: dir, path }
    }

    /// Open a new, independent connection to the database
    pub async fn connect(&self) -> Arc<dyn QueueBackend> {
        Arc::new(SqliteBackend::open(self.path.clone(), 10_000).await.unwrap())
    }
}

#[allow(dead_code)]
pub fn queue_name(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

#[allow(dead_code)]
pub fn secs(seconds: i64) -> VisibilityTimeout {
    VisibilityTimeout::from_secs(seconds).unwrap()
}
