//! Ingestor: recovery plus batch writing behind one handle
//!
//! # Flow
//!
//! 1. Validate config
//! 2. Build the checkpoint manager (and snapshot writer, if configured)
//! 3. Run crash recovery
//! 4. Resume the batch writer at the recovered batch
//!
//! After `open` returns, [`Ingestor::ingest`] continues numbering from the
//! recovered batch, so a restarted process picks up where the previous one
//! stopped.

use std::sync::Arc;

use docsink_core::{BatchId, Document, DocumentStore, Error, Result, StorageError};

use crate::checkpoint::CheckpointManager;
use crate::config::IngestConfig;
use crate::recovery::{CrashRecoveryHandler, IntegrityReport, RecoveryOutcome, RecoveryResult};
use crate::writer::{IngestSummary, StreamingBatchWriter};

/// A recovered, ready-to-write ingestion pipeline
#[derive(Debug)]
pub struct Ingestor {
    recovery: CrashRecoveryHandler,
    writer: StreamingBatchWriter,
    recovered: RecoveryResult,
    next_batch: BatchId,
}

impl Ingestor {
    /// Recover `store` and prepare to write
    ///
    /// # Errors
    ///
    /// - `Validation` if the config is invalid
    /// - `StorageUnavailable` / `CorruptCheckpoint` if recovery failed for
    ///   that reason
    /// - `Storage` if recovery failed for any other reason
    /// - `IoError` if the snapshot directory cannot be created
    pub fn open(store: Arc<dyn DocumentStore>, config: IngestConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let checkpoints = Arc::new(CheckpointManager::from_config(store, &config)?);
        let recovery = CrashRecoveryHandler::new(checkpoints.clone());
        let recovered = recovery.recover();
        if !recovered.success {
            let msg = recovered.error.clone().unwrap_or_default();
            return Err(match recovered.outcome {
                RecoveryOutcome::StorageUnavailable => Error::StorageUnavailable(msg),
                RecoveryOutcome::CorruptCheckpoint => Error::CorruptCheckpoint(msg),
                _ => Error::Storage(StorageError::Backend(msg)),
            });
        }

        let mut writer = StreamingBatchWriter::new(checkpoints, config)?;
        let point = recovered.recovery_point();
        writer.resume_at(&point);
        let next_batch = writer.start_batch(&point);

        Ok(Ingestor {
            recovery,
            writer,
            recovered,
            next_batch,
        })
    }

    /// What recovery found when the ingestor was opened
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovered
    }

    /// Id the next ingested batch will get
    pub fn next_batch(&self) -> &BatchId {
        &self.next_batch
    }

    /// The underlying batch writer
    pub fn writer(&mut self) -> &mut StreamingBatchWriter {
        &mut self.writer
    }

    /// The checkpoint manager
    pub fn checkpoints(&self) -> &Arc<CheckpointManager> {
        self.writer.checkpoints()
    }

    /// Persist `documents` in batches, continuing the id sequence
    ///
    /// If a batch fails, the next call retries from that batch id.
    pub fn ingest<I>(&mut self, documents: I) -> Result<IngestSummary>
    where
        I: IntoIterator<Item = Document>,
    {
        let summary = self.writer.ingest(documents, self.next_batch.clone())?;
        self.next_batch = summary.next_batch.clone();
        Ok(summary)
    }

    /// Check the checkpoint against storage
    pub fn validate_integrity(&self) -> IntegrityReport {
        self.recovery.validate_integrity()
    }
}
