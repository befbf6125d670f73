//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

pub use docsink::{
    BatchId, CheckpointManager, CrashRecoveryHandler, Document, DocumentStore, Error,
    IngestConfig, Ingestor, IntegrityLevel, MemoryStore, RecoveryOutcome, SqliteStore,
    StreamingBatchWriter,
};
pub use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown with `--nocapture`)
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// TestStore - a store that can be "restarted"
// ============================================================================

/// Which backend a [`TestStore`] wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

/// Test store wrapper.
///
/// `restart()` simulates a process restart: the SQLite store is reopened from
/// its file, the memory store is kept (it plays the part of an external
/// service that outlives the process).
pub struct TestStore {
    pub kind: StoreKind,
    pub store: Arc<dyn DocumentStore>,
    pub dir: TempDir,
}

impl TestStore {
    pub fn memory() -> Self {
        TestStore {
            kind: StoreKind::Memory,
            store: Arc::new(MemoryStore::new()),
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn sqlite() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = SqliteStore::open(dir.path().join("docs.db")).expect("Failed to open store");
        TestStore {
            kind: StoreKind::Sqlite,
            store: Arc::new(store),
            dir,
        }
    }

    /// One of each backend
    pub fn all() -> Vec<TestStore> {
        vec![TestStore::memory(), TestStore::sqlite()]
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("docs.db")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("checkpoint.json")
    }

    /// Simulate a process restart
    pub fn restart(&mut self) {
        if self.kind == StoreKind::Sqlite {
            self.store = Arc::new(SqliteStore::open(self.db_path()).expect("Failed to reopen"));
        }
    }

    pub fn checkpoints(&self) -> Arc<CheckpointManager> {
        Arc::new(CheckpointManager::new(self.store.clone()))
    }

    /// Fresh writer and recovery handler sharing one checkpoint manager
    pub fn pipeline(&self, config: IngestConfig) -> (StreamingBatchWriter, CrashRecoveryHandler) {
        let checkpoints = self.checkpoints();
        let handler = CrashRecoveryHandler::new(checkpoints.clone());
        let writer = StreamingBatchWriter::new(checkpoints, config).expect("valid config");
        (writer, handler)
    }

    pub fn count(&self) -> u64 {
        self.store.document_count().expect("count")
    }
}

// ============================================================================
// Documents
// ============================================================================

/// `n` well-formed documents with ids `<prefix>_<i>`
pub fn docs(prefix: &str, n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            Document::new(format!("{prefix}_{i}"), format!("# {prefix} {i}\n\nbody"))
                .with_title(format!("{prefix} {i}"))
        })
        .collect()
}

/// Batch id `batch_<n>` with the default padding
pub fn batch(n: u64) -> String {
    IngestConfig::default().batch_id(n).to_string()
}
