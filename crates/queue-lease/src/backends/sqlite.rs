//! SQLite backend.
//!
//! Every operation runs on the blocking thread pool against one connection
//! guarded by a mutex. Claims run inside an `IMMEDIATE` transaction so the
//! write lock is taken before the candidate rows are read; separate
//! processes sharing the database file are serialized by SQLite itself and
//! wait up to the configured busy timeout for each other.
//!
//! The current time used for lease decisions is read from the store
//! (`julianday('now')`), so every process sharing a file agrees on it.

use crate::backend::{validate_max_messages, BackendConfig, BackendKind, QueueBackend};
use crate::error::QueueError;
use crate::message::{
    Checksum, LeaseToken, MessageId, MessageRecord, QueueId, QueueName, QueueRecord, Timestamp,
    VisibilityTimeout,
};
use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

/// Milliseconds since the Unix epoch according to the store
const NOW_MS_SQL: &str = "SELECT CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

const SCHEMA_SQL: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA foreign_keys=ON;

    CREATE TABLE IF NOT EXISTS queue (
      queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
      queue_name TEXT NOT NULL UNIQUE,
      timeout_seconds INTEGER NOT NULL CHECK (timeout_seconds > 0)
    );

    CREATE TABLE IF NOT EXISTS message (
      message_id INTEGER PRIMARY KEY AUTOINCREMENT,
      queue_id INTEGER NOT NULL REFERENCES queue(queue_id) ON DELETE CASCADE,
      handle TEXT UNIQUE,
      body BLOB NOT NULL,
      checksum TEXT NOT NULL,
      created_at_ms INTEGER NOT NULL,
      lease_expires_at_ms INTEGER
    );

    CREATE INDEX IF NOT EXISTS message_queue_id_idx ON message(queue_id);
"#;

const MESSAGE_COLUMNS: &str =
    "message_id, queue_id, body, checksum, created_at_ms, handle, lease_expires_at_ms";

/// Lease store backed by a SQLite database file.
///
/// Cloning shares the same connection.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    busy_timeout_ms: u64,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and install the schema.
    ///
    /// The parent directory must already exist; an unreachable file is
    /// reported as [`QueueError::ConnectionFailed`].
    pub async fn open(path: impl Into<PathBuf>, busy_timeout_ms: u64) -> Result<Self, QueueError> {
        let path = path.into();
        let open_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path, busy_timeout_ms))
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("connection task failed: {e}"),
            })??;

        info!(path = %path.display(), busy_timeout_ms, "Opened SQLite queue store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            busy_timeout_ms,
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| QueueError::store(operation, "connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| QueueError::store(operation, format!("blocking task failed: {e}")))?
    }
}

fn open_connection(path: &Path, busy_timeout_ms: u64) -> Result<Connection, QueueError> {
    let connection_failed = |e: rusqlite::Error| QueueError::ConnectionFailed {
        message: format!("{}: {e}", path.display()),
    };

    let conn = Connection::open(path).map_err(connection_failed)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(connection_failed)?;
    conn.execute_batch(SCHEMA_SQL).map_err(connection_failed)?;
    Ok(conn)
}

fn map_sqlite_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> QueueError {
    move |err| QueueError::store(operation, err.to_string())
}

fn now_ms(tx: &Transaction<'_>, operation: &'static str) -> Result<i64, QueueError> {
    tx.query_row(NOW_MS_SQL, [], |row| row.get(0))
        .map_err(map_sqlite_err(operation))
}

fn lookup_queue(
    tx: &Transaction<'_>,
    name: &QueueName,
    operation: &'static str,
) -> Result<Option<QueueRecord>, QueueError> {
    let row: Option<(i64, i64)> = tx
        .query_row(
            "SELECT queue_id, timeout_seconds FROM queue WHERE queue_name = ?1",
            params![name.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(map_sqlite_err(operation))?;

    Ok(row.map(|(id, timeout_seconds)| QueueRecord {
        id: QueueId::new(id),
        name: name.clone(),
        default_timeout_seconds: u32::try_from(timeout_seconds)
            .unwrap_or(VisibilityTimeout::DEFAULT_SECONDS),
    }))
}

fn require_queue(
    tx: &Transaction<'_>,
    name: &QueueName,
    operation: &'static str,
) -> Result<QueueRecord, QueueError> {
    lookup_queue(tx, name, operation)?.ok_or_else(|| QueueError::QueueNotFound {
        queue_name: name.to_string(),
    })
}

/// Message row exactly as stored
struct MessageRow {
    id: i64,
    queue_id: i64,
    body: Vec<u8>,
    checksum: String,
    created_at_ms: i64,
    handle: Option<String>,
    lease_expires_at_ms: Option<i64>,
}

impl MessageRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            queue_id: row.get(1)?,
            body: row.get(2)?,
            checksum: row.get(3)?,
            created_at_ms: row.get(4)?,
            handle: row.get(5)?,
            lease_expires_at_ms: row.get(6)?,
        })
    }

    fn into_record(self, operation: &'static str) -> Result<MessageRecord, QueueError> {
        let timestamp = |millis: i64| {
            Timestamp::from_millis(millis).ok_or_else(|| {
                QueueError::store(operation, format!("stored timestamp out of range: {millis}"))
            })
        };

        let lease_token = self
            .handle
            .map(LeaseToken::new)
            .transpose()
            .map_err(|e| QueueError::store(operation, format!("stored lease token: {e}")))?;

        Ok(MessageRecord {
            id: MessageId::new(self.id),
            queue_id: QueueId::new(self.queue_id),
            body: Bytes::from(self.body),
            checksum: Checksum::from_stored(self.checksum),
            created_at: timestamp(self.created_at_ms)?,
            lease_token,
            lease_expires_at: self.lease_expires_at_ms.map(timestamp).transpose()?,
        })
    }
}

#[async_trait]
impl QueueBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn config(&self) -> BackendConfig {
        BackendConfig::Sqlite {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }

    #[instrument(skip(self), fields(queue = %name))]
    async fn create_queue(
        &self,
        name: &QueueName,
        default_timeout: VisibilityTimeout,
    ) -> Result<bool, QueueError> {
        let name = name.clone();
        let timeout_seconds = i64::from(default_timeout.whole_seconds());

        self.with_connection("create_queue", move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO queue (queue_name, timeout_seconds) VALUES (?1, ?2)
                     ON CONFLICT(queue_name) DO NOTHING",
                    params![name.as_str(), timeout_seconds],
                )
                .map_err(map_sqlite_err("create_queue"))?;

            if inserted == 1 {
                info!(queue = %name, timeout_seconds, "Created queue");
            }
            Ok(inserted == 1)
        })
        .await
    }

    #[instrument(skip(self), fields(queue = %name))]
    async fn delete_queue(&self, name: &QueueName) -> Result<bool, QueueError> {
        let name = name.clone();

        self.with_connection("delete_queue", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sqlite_err("delete_queue"))?;

            let Some(queue) = lookup_queue(&tx, &name, "delete_queue")? else {
                return Ok(false);
            };

            // Removed explicitly as well so the cascade does not depend on
            // the foreign_keys pragma of whichever connection deletes.
            let messages = tx
                .execute(
                    "DELETE FROM message WHERE queue_id = ?1",
                    params![queue.id.as_i64()],
                )
                .map_err(map_sqlite_err("delete_queue"))?;
            tx.execute(
                "DELETE FROM queue WHERE queue_id = ?1",
                params![queue.id.as_i64()],
            )
            .map_err(map_sqlite_err("delete_queue"))?;

            tx.commit().map_err(map_sqlite_err("delete_queue"))?;

            info!(queue = %name, messages, "Deleted queue and its messages");
            Ok(true)
        })
        .await
    }

    async fn queue_record(&self, name: &QueueName) -> Result<Option<QueueRecord>, QueueError> {
        let name = name.clone();

        self.with_connection("queue_record", move |conn| {
            let tx = conn.transaction().map_err(map_sqlite_err("queue_record"))?;
            lookup_queue(&tx, &name, "queue_record")
        })
        .await
    }

    async fn is_exists(&self, name: &QueueName) -> Result<bool, QueueError> {
        Ok(self.queue_record(name).await?.is_some())
    }

    async fn get_queues(&self) -> Result<BTreeSet<QueueName>, QueueError> {
        self.with_connection("get_queues", |conn| {
            let mut stmt = conn
                .prepare("SELECT queue_name FROM queue")
                .map_err(map_sqlite_err("get_queues"))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_sqlite_err("get_queues"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sqlite_err("get_queues"))?;

            names
                .into_iter()
                .map(|name| {
                    QueueName::new(name).map_err(|e| {
                        QueueError::store("get_queues", format!("stored queue name: {e}"))
                    })
                })
                .collect()
        })
        .await
    }

    async fn count(&self, name: &QueueName) -> Result<u64, QueueError> {
        let name = name.clone();

        self.with_connection("count", move |conn| {
            let tx = conn.transaction().map_err(map_sqlite_err("count"))?;
            let queue = require_queue(&tx, &name, "count")?;
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM message WHERE queue_id = ?1",
                    params![queue.id.as_i64()],
                    |row| row.get(0),
                )
                .map_err(map_sqlite_err("count"))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    #[instrument(skip(self, body), fields(queue = %name, size = body.len()))]
    async fn send(&self, name: &QueueName, body: Bytes) -> Result<MessageRecord, QueueError> {
        let name = name.clone();

        self.with_connection("send", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sqlite_err("send"))?;
            let queue = require_queue(&tx, &name, "send")?;
            let created_at_ms = now_ms(&tx, "send")?;
            let checksum = Checksum::compute(&body);

            tx.execute(
                "INSERT INTO message (queue_id, handle, body, checksum, created_at_ms, lease_expires_at_ms)
                 VALUES (?1, NULL, ?2, ?3, ?4, NULL)",
                params![
                    queue.id.as_i64(),
                    body.as_ref(),
                    checksum.as_str(),
                    created_at_ms
                ],
            )
            .map_err(map_sqlite_err("send"))?;
            let id = MessageId::new(tx.last_insert_rowid());

            tx.commit().map_err(map_sqlite_err("send"))?;

            let created_at = Timestamp::from_millis(created_at_ms).ok_or_else(|| {
                QueueError::store("send", format!("store clock out of range: {created_at_ms}"))
            })?;

            debug!(queue = %name, message_id = %id, "Message sent");
            Ok(MessageRecord {
                id,
                queue_id: queue.id,
                body,
                checksum,
                created_at,
                lease_token: None,
                lease_expires_at: None,
            })
        })
        .await
    }

    #[instrument(skip(self), fields(queue = %name))]
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

        let name = name.clone();
        let limit = i64::try_from(max_messages).unwrap_or(i64::MAX);
        let timeout_ms = timeout.as_millis();

        self.with_connection("claim", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sqlite_err("claim"))?;
            let queue = require_queue(&tx, &name, "claim")?;
            let now = now_ms(&tx, "claim")?;
            let expires_at = now.saturating_add(timeout_ms);

            let candidates = {
                let mut stmt = tx
                    .prepare(
                        "SELECT message_id FROM message
                         WHERE queue_id = ?1 AND (handle IS NULL OR lease_expires_at_ms < ?2)
                         LIMIT ?3",
                    )
                    .map_err(map_sqlite_err("claim"))?;
                let ids = stmt
                    .query_map(params![queue.id.as_i64(), now, limit], |row| {
                        row.get::<_, i64>(0)
                    })
                    .map_err(map_sqlite_err("claim"))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(map_sqlite_err("claim"))?;
                ids
            };

            let select_sql = format!("SELECT {MESSAGE_COLUMNS} FROM message WHERE message_id = ?1");
            let mut claimed = Vec::with_capacity(candidates.len());
            for id in candidates {
                let token = LeaseToken::generate();
                let changed = tx
                    .execute(
                        "UPDATE message SET handle = ?1, lease_expires_at_ms = ?2
                         WHERE message_id = ?3 AND (handle IS NULL OR lease_expires_at_ms < ?4)",
                        params![token.as_str(), expires_at, id, now],
                    )
                    .map_err(map_sqlite_err("claim"))?;
                if changed != 1 {
                    warn!(message_id = id, "Lease race lost, skipping message");
                    continue;
                }

                let row = tx
                    .query_row(&select_sql, params![id], MessageRow::read)
                    .map_err(map_sqlite_err("claim"))?;
                claimed.push(row.into_record("claim")?);
            }

            tx.commit().map_err(map_sqlite_err("claim"))?;

            debug!(queue = %name, claimed = claimed.len(), "Claimed messages");
            Ok(claimed)
        })
        .await
    }

    async fn delete_message(&self, token: &LeaseToken) -> Result<bool, QueueError> {
        let token = token.clone();

        self.with_connection("delete_message", move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM message WHERE handle = ?1",
                    params![token.as_str()],
                )
                .map_err(map_sqlite_err("delete_message"))?;

            debug!(deleted, "Delete by lease token");
            Ok(deleted > 0)
        })
        .await
    }
}
