//! SqliteStore: durable storage backend
//!
//! Schema:
//!
//! - `documents`: one row per document, primary key on the document id,
//!   tagged with the batch it arrived in
//! - `checkpoints`: append-only ledger; "latest" is the highest rowid. The
//!   record is kept verbatim in the `record` JSON column next to the queryable
//!   columns, so a malformed record reads back exactly as it was written
//! - `recovery_log`: one row per partial batch discarded during recovery
//!
//! # Atomicity
//!
//! A batch insert runs in a single transaction, so a crash or a duplicate id
//! leaves no rows behind. Checkpoint writes take an `IMMEDIATE` transaction;
//! if another connection holds the write lock, SQLite answers `BUSY`/`LOCKED`
//! and the write surfaces as [`StorageError::Conflict`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use docsink_core::{is_partial_batch, Document, DocumentStore, StorageError, StorageResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        batch_id TEXT NOT NULL,
        headers TEXT,
        title TEXT,
        sections TEXT,
        metadata TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_documents_batch_id ON documents (batch_id);
    CREATE TABLE IF NOT EXISTS checkpoints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        last_batch_id TEXT,
        total_persisted INTEGER DEFAULT 0,
        status TEXT DEFAULT 'pending',
        timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
        db_count_matches INTEGER NOT NULL DEFAULT 0,
        metadata TEXT,
        record TEXT
    );
    CREATE TABLE IF NOT EXISTS recovery_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation TEXT NOT NULL,
        batch_id TEXT,
        status TEXT NOT NULL,
        details TEXT,
        timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
    );
";

/// One row of the recovery log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryLogEntry {
    /// What was done (`discard_partial_batch`)
    pub operation: String,
    /// Batch affected
    pub batch_id: Option<String>,
    /// Outcome
    pub status: String,
    /// Free-form details
    pub details: Option<String>,
}

/// SQLite-backed document store
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        info!(target: "docsink::storage", path = %path.as_ref().display(), "Opened SQLite store");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// How long a write waits for another connection's lock before the
    /// store reports [`StorageError::Conflict`]
    pub fn set_busy_timeout(&self, timeout: Duration) -> StorageResult<()> {
        self.conn.lock().busy_timeout(timeout).map_err(map_sqlite_err)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)?;
        Self::migrate(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Add the `record` column to ledgers created without it
    fn migrate(conn: &Connection) -> StorageResult<()> {
        let mut stmt = conn
            .prepare("SELECT name FROM pragma_table_info('checkpoints')")
            .map_err(map_sqlite_err)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        if !columns.iter().any(|c| c == "record") {
            conn.execute_batch("ALTER TABLE checkpoints ADD COLUMN record TEXT")
                .map_err(map_sqlite_err)?;
            info!(target: "docsink::storage", "Added record column to checkpoint ledger");
        }
        Ok(())
    }

    /// Documents tagged with `batch_id`, ordered by id
    pub fn documents_in_batch(&self, batch_id: &str) -> StorageResult<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, content, title, headers, sections, metadata
                 FROM documents WHERE batch_id = ?1 ORDER BY id",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params![batch_id], |row| {
                Ok(Document {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    title: row.get(2)?,
                    headers: row.get(3)?,
                    sections: row.get(4)?,
                    metadata: row.get(5)?,
                })
            })
            .map_err(map_sqlite_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqlite_err)
    }

    /// Document count per batch tag
    pub fn batch_counts(&self) -> StorageResult<BTreeMap<String, u64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT batch_id, COUNT(*) FROM documents GROUP BY batch_id")
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(map_sqlite_err)?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (batch_id, count) = row.map_err(map_sqlite_err)?;
            counts.insert(batch_id, count.max(0) as u64);
        }
        Ok(counts)
    }

    /// Remove documents by id, returning how many existed
    pub fn delete_documents(&self, ids: &[&str]) -> StorageResult<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let mut removed = 0u64;
        for id in ids {
            removed += tx
                .execute("DELETE FROM documents WHERE id = ?1", params![id])
                .map_err(map_sqlite_err)? as u64;
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(removed)
    }

    /// Recovery log, oldest first
    pub fn recovery_log(&self) -> StorageResult<Vec<RecoveryLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT operation, batch_id, status, details FROM recovery_log ORDER BY id")
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RecoveryLogEntry {
                    operation: row.get(0)?,
                    batch_id: row.get(1)?,
                    status: row.get(2)?,
                    details: row.get(3)?,
                })
            })
            .map_err(map_sqlite_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqlite_err)
    }

    fn latest_checkpoint_in(conn: &Connection) -> StorageResult<Option<Value>> {
        conn.query_row(
            "SELECT last_batch_id, total_persisted, status, timestamp, db_count_matches, metadata,
                    record
             FROM checkpoints ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                if let Some(record) = row.get::<_, Option<Value>>(6)? {
                    return Ok(record);
                }

                // Rows written before the record column existed
                let mut record = Map::new();
                record.insert(
                    "last_batch_id".to_string(),
                    row.get::<_, Option<String>>(0)?.map_or(Value::Null, Value::from),
                );
                record.insert(
                    "total_persisted".to_string(),
                    row.get::<_, Option<i64>>(1)?.map_or(Value::Null, Value::from),
                );
                record.insert(
                    "status".to_string(),
                    row.get::<_, Option<String>>(2)?.map_or(Value::Null, Value::from),
                );
                record.insert(
                    "timestamp".to_string(),
                    row.get::<_, Option<String>>(3)?.map_or(Value::Null, Value::from),
                );
                record.insert(
                    "db_count_matches".to_string(),
                    Value::Bool(row.get::<_, i64>(4)? != 0),
                );
                if let Some(metadata) = row.get::<_, Option<Value>>(5)? {
                    record.insert("metadata".to_string(), metadata);
                }
                Ok(Value::Object(record))
            },
        )
        .optional()
        .map_err(map_sqlite_err)
    }

    fn partial_batches_in(conn: &Connection) -> StorageResult<Vec<String>> {
        let latest = Self::latest_checkpoint_in(conn)?;
        let last = latest
            .as_ref()
            .and_then(|record| record.get("last_batch_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());

        let mut stmt = conn
            .prepare("SELECT DISTINCT batch_id FROM documents")
            .map_err(map_sqlite_err)?;
        let batch_ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;

        Ok(batch_ids
            .into_iter()
            .filter(|batch_id| is_partial_batch(batch_id, last))
            .collect())
    }
}

impl DocumentStore for SqliteStore {
    fn insert_documents(&self, documents: &[Document], batch_id: &str) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO documents (id, content, batch_id, headers, title, sections, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(map_sqlite_err)?;
            for doc in documents {
                let id = doc
                    .doc_id()
                    .ok_or_else(|| StorageError::backend("document has no id"))?;
                stmt.execute(params![
                    id,
                    doc.content.as_deref().unwrap_or_default(),
                    batch_id,
                    doc.headers,
                    doc.title,
                    doc.sections,
                    doc.metadata,
                ])
                .map_err(|e| match map_sqlite_err(e) {
                    StorageError::DuplicateDocument(_) => {
                        StorageError::DuplicateDocument(id.to_string())
                    }
                    other => other,
                })?;
            }
        }
        tx.commit().map_err(map_sqlite_err)?;
        debug!(target: "docsink::storage", batch_id, count = documents.len(), "Inserted documents");
        Ok(())
    }

    fn document_count(&self) -> StorageResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(map_sqlite_err)?;
        Ok(count.max(0) as u64)
    }

    fn save_checkpoint(&self, record: &Value) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_err)?;
        tx.execute(
            "INSERT INTO checkpoints
                (last_batch_id, total_persisted, status, timestamp, db_count_matches, metadata,
                 record)
             VALUES (?1, ?2, ?3, COALESCE(?4, CURRENT_TIMESTAMP), ?5, ?6, ?7)",
            params![
                record.get("last_batch_id").and_then(Value::as_str),
                record.get("total_persisted").and_then(Value::as_i64),
                record.get("status").and_then(Value::as_str),
                record.get("timestamp").and_then(Value::as_str),
                record
                    .get("db_count_matches")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                record.get("metadata").filter(|m| !m.is_null()),
                record,
            ],
        )
        .map_err(map_sqlite_err)?;
        tx.commit().map_err(map_sqlite_err)
    }

    fn latest_checkpoint(&self) -> StorageResult<Option<Value>> {
        let conn = self.conn.lock();
        Self::latest_checkpoint_in(&conn)
    }

    fn has_partial_batch(&self) -> StorageResult<bool> {
        let conn = self.conn.lock();
        Ok(!Self::partial_batches_in(&conn)?.is_empty())
    }

    fn discard_partial_batch(&self) -> StorageResult<u64> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_err)?;
        let partial = Self::partial_batches_in(&tx)?;

        let mut removed = 0u64;
        for batch_id in &partial {
            let n = tx
                .execute("DELETE FROM documents WHERE batch_id = ?1", params![batch_id])
                .map_err(map_sqlite_err)? as u64;
            tx.execute(
                "INSERT INTO recovery_log (operation, batch_id, status, details)
                 VALUES ('discard_partial_batch', ?1, 'discarded', ?2)",
                params![batch_id, format!("removed {n} documents")],
            )
            .map_err(map_sqlite_err)?;
            warn!(target: "docsink::storage", batch_id = %batch_id, removed = n, "Discarded partial batch");
            removed += n;
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(removed)
    }

    fn discard_batch(&self, batch_id: &str) -> StorageResult<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let removed = tx
            .execute("DELETE FROM documents WHERE batch_id = ?1", params![batch_id])
            .map_err(map_sqlite_err)? as u64;
        if removed > 0 {
            tx.execute(
                "INSERT INTO recovery_log (operation, batch_id, status, details)
                 VALUES ('discard_batch', ?1, 'discarded', ?2)",
                params![batch_id, format!("removed {removed} documents")],
            )
            .map_err(map_sqlite_err)?;
            warn!(target: "docsink::storage", batch_id, removed, "Discarded batch documents");
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(removed)
    }

    fn check_connection(&self) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

fn map_sqlite_err(e: rusqlite::Error) -> StorageError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StorageError::Conflict(e.to_string())
        }
        Some(ErrorCode::ConstraintViolation) => StorageError::DuplicateDocument(e.to_string()),
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::NotADatabase) => {
            StorageError::Unavailable(e.to_string())
        }
        _ => StorageError::Backend(e.to_string()),
    }
}
