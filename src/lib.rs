//! Docsink - crash-safe batched document ingestion
//!
//! Docsink persists documents in numbered batches and keeps an append-only
//! checkpoint ledger next to them, so an interrupted run can be resumed
//! without losing or double-counting a batch.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use docsink::{Document, IngestConfig, Ingestor, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::open("docs.db")?);
//!
//! // Recovers from any previous crash, then resumes numbering
//! let mut ingestor = Ingestor::open(store, IngestConfig::default())?;
//! let summary = ingestor.ingest(vec![Document::new("guide.md", "# Guide")])?;
//! ```
//!
//! # Architecture
//!
//! - `docsink-core`: batch id format, documents, checkpoint records, errors,
//!   and the [`DocumentStore`] trait
//! - `docsink-storage`: [`MemoryStore`], [`SqliteStore`], and a fault-injection
//!   wrapper for tests
//! - `docsink-durability`: [`CheckpointManager`], [`StreamingBatchWriter`],
//!   [`CrashRecoveryHandler`], and the [`Ingestor`] facade

pub use docsink_core::{
    batch_number, is_partial_batch, next_batch_id, strip_partial, validate_batch, BatchId,
    Checkpoint, CheckpointStatus, ConsistencyReport, Document, DocumentStore, Error,
    RecoveryPoint, Result, StorageError, StorageResult, PARTIAL_SUFFIX,
};
pub use docsink_durability::{
    load_snapshot, BatchResult, CheckpointManager, ConfigError, CrashRecoveryHandler,
    IngestConfig, IngestSummary, Ingestor, IntegrityLevel, IntegrityReport, RecoveryOutcome,
    RecoveryResult, SnapshotWriter, StreamingBatchWriter, MAX_BATCH_ID_WIDTH,
};
pub use docsink_storage::{MemoryStore, RecoveryLogEntry, SqliteStore};

/// Fault injection for tests
pub mod testing {
    pub use docsink_storage::testing::{FailPoint, FaultyStore};
}
