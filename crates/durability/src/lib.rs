//! Durability layer for docsink
//!
//! This crate owns the ingestion protocol on top of a
//! [`DocumentStore`](docsink_core::DocumentStore):
//!
//! - CheckpointManager: cumulative persisted counts, ledger writes, consistency checks
//! - SnapshotWriter: crash-safe local mirror of the latest checkpoint
//! - StreamingBatchWriter: validate, insert, then checkpoint, one batch at a time
//! - CrashRecoveryHandler: resume point, partial batch cleanup, integrity report
//! - IngestConfig: batch sizing and id layout
//! - Ingestor: recover, resume, and ingest behind one handle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint; // Cumulative checkpoint tracking
pub mod config; // Ingestion configuration
pub mod ingestor; // Recovery + writer facade
pub mod recovery; // Startup recovery and integrity validation
pub mod snapshot; // Local checkpoint snapshot (write-fsync-rename)
pub mod writer; // Batch pipeline

pub use checkpoint::CheckpointManager;
pub use config::{ConfigError, IngestConfig, MAX_BATCH_ID_WIDTH};
pub use ingestor::Ingestor;
pub use recovery::{
    CrashRecoveryHandler, IntegrityLevel, IntegrityReport, RecoveryOutcome, RecoveryResult,
};
pub use snapshot::{load_snapshot, SnapshotWriter};
pub use writer::{BatchResult, IngestSummary, StreamingBatchWriter};
