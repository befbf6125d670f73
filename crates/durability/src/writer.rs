//! Streaming batch writer
//!
//! Persists documents one batch at a time and advances the checkpoint only
//! after storage confirms the batch:
//!
//! ```text
//! process_batch ─► validate ─► insert_documents ─► update_checkpoint
//!                     │               │                   │
//!                  Err(..)     BatchResult::failed   BatchResult::failed
//! ```
//!
//! Validation failures are returned as `Err` before anything is touched.
//! Storage failures are folded into a failed [`BatchResult`]; the checkpoint
//! never points past data that is not durably stored.
//!
//! # Batch ids
//!
//! Recovery classifies stored documents by comparing their batch number with
//! the last checkpointed one, so the writer only accepts ids it can order:
//! `<configured prefix>_<digits>`, each numbered above the last committed
//! batch. Empty, `_partial` tagged and otherwise non-conforming ids are
//! validation errors.
//!
//! Ids committed this session are remembered. After [`StreamingBatchWriter::resume_at`]
//! the recovered batch also acts as a high-water mark, so ids at or below it
//! are rejected without reaching storage.
//!
//! # Rollback
//!
//! If the insert succeeds but the checkpoint cannot be written, the batch's
//! documents are removed again with [`DocumentStore::discard_batch`]. Should
//! that fail too, the writer refuses further batches until the rollback goes
//! through, so no later checkpoint can cover the orphaned rows.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use docsink_core::{
    validate_batch, BatchId, Document, DocumentStore, Error, RecoveryPoint, Result,
};

use crate::checkpoint::CheckpointManager;
use crate::config::IngestConfig;

/// Outcome of persisting one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// True if documents and checkpoint were both persisted
    pub success: bool,
    /// Documents persisted (0 on failure)
    pub persisted_count: usize,
    /// Batch the result describes
    pub batch_id: String,
    /// True if a checkpoint was written for this batch
    pub checkpoint_updated: bool,
    /// Failure message
    pub error: Option<String>,
}

impl BatchResult {
    fn committed(batch_id: &str, persisted_count: usize) -> Self {
        BatchResult {
            success: true,
            persisted_count,
            batch_id: batch_id.to_string(),
            checkpoint_updated: true,
            error: None,
        }
    }

    fn failed(batch_id: &str, error: &Error) -> Self {
        BatchResult {
            success: false,
            persisted_count: 0,
            batch_id: batch_id.to_string(),
            checkpoint_updated: false,
            error: Some(error.to_string()),
        }
    }
}

/// Totals from [`StreamingBatchWriter::ingest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    /// Batches committed
    pub batches: u64,
    /// Documents persisted
    pub persisted: u64,
    /// Id to use for the next batch (the failed one, if ingestion stopped)
    pub next_batch: BatchId,
    /// The batch that stopped ingestion
    pub failed: Option<BatchResult>,
}

impl IngestSummary {
    /// Returns true if every document was persisted
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

/// Single-writer batch pipeline over a [`CheckpointManager`]
pub struct StreamingBatchWriter {
    store: Arc<dyn DocumentStore>,
    checkpoints: Arc<CheckpointManager>,
    config: IngestConfig,
    processed: HashSet<String>,
    pending: BTreeMap<String, Vec<Document>>,
    committed_mark: Option<BatchId>,
    orphaned: Option<String>,
}

impl StreamingBatchWriter {
    /// Create a writer
    ///
    /// # Errors
    ///
    /// `Validation` if the config is invalid.
    pub fn new(checkpoints: Arc<CheckpointManager>, config: IngestConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;
        Ok(StreamingBatchWriter {
            store: checkpoints.store().clone(),
            checkpoints,
            config,
            processed: HashSet::new(),
            pending: BTreeMap::new(),
            committed_mark: None,
            orphaned: None,
        })
    }

    /// The checkpoint manager this writer advances
    pub fn checkpoints(&self) -> &Arc<CheckpointManager> {
        &self.checkpoints
    }

    /// Writer configuration
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Returns true if `batch_id` was committed by this writer
    pub fn is_processed(&self, batch_id: &str) -> bool {
        self.processed.contains(batch_id)
    }

    /// Validate and persist a batch
    ///
    /// # Errors
    ///
    /// `Validation` for an empty batch, a non-conforming id, an id already
    /// processed (or pending, or at or below the resume mark), an id not
    /// numbered above the last committed batch, or a malformed document.
    /// Nothing is written in that case. Storage failures are reported through
    /// the returned [`BatchResult`], not as `Err`.
    pub fn process_batch(&mut self, documents: &[Document], batch_id: &str) -> Result<BatchResult> {
        self.validate(documents, batch_id)?;
        Ok(self.persist(documents, batch_id))
    }

    /// Validate a batch and park it until [`commit_batch`](Self::commit_batch)
    pub fn stage_batch(&mut self, documents: Vec<Document>, batch_id: impl Into<String>) -> Result<()> {
        let batch_id = batch_id.into();
        self.validate(&documents, &batch_id)?;
        self.pending.insert(batch_id, documents);
        Ok(())
    }

    /// Persist a staged batch
    ///
    /// Returns whether the batch was committed. A batch that fails to persist
    /// stays pending so it can be retried or aborted.
    ///
    /// # Errors
    ///
    /// `BatchNotFound` if `batch_id` is not pending. `Validation` if a later
    /// batch was committed since it was staged; it stays pending.
    pub fn commit_batch(&mut self, batch_id: &str) -> Result<bool> {
        if !self.pending.contains_key(batch_id) {
            return Err(Error::BatchNotFound(format!("Batch {batch_id} not found")));
        }
        let id = self.parse_batch_id(batch_id)?;
        self.check_order(&id)?;
        let documents = self
            .pending
            .remove(batch_id)
            .ok_or_else(|| Error::BatchNotFound(format!("Batch {batch_id} not found")))?;
        let result = self.persist(&documents, batch_id);
        if !result.success {
            self.pending.insert(batch_id.to_string(), documents);
        }
        Ok(result.success)
    }

    /// Drop a staged batch, returning its documents
    pub fn abort_batch(&mut self, batch_id: &str) -> Result<Vec<Document>> {
        self.pending
            .remove(batch_id)
            .ok_or_else(|| Error::BatchNotFound(format!("Batch {batch_id} not found")))
    }

    /// Ids of staged batches, in order
    pub fn pending_batches(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Batch whose rollback is still outstanding, if any
    pub fn orphaned_batch(&self) -> Option<&str> {
        self.orphaned.as_deref()
    }

    /// Continue after a recovery
    ///
    /// Records the recovered batch as the committed high-water mark.
    pub fn resume_at(&mut self, point: &RecoveryPoint) {
        self.committed_mark = point.last_batch_id.as_deref().and_then(BatchId::parse);
        info!(
            target: "docsink::writer",
            last_batch_id = ?point.last_batch_id,
            total_persisted = point.total_persisted,
            "Writer resumed"
        );
    }

    /// First batch id to use after `point`
    ///
    /// The id following the recovered batch, or the configured first id when
    /// there is nothing to resume.
    pub fn start_batch(&self, point: &RecoveryPoint) -> BatchId {
        point
            .last_batch_id
            .as_deref()
            .and_then(BatchId::parse)
            .and_then(|last| last.next())
            .unwrap_or_else(|| self.config.first_batch_id())
    }

    /// Chunk `documents` into batches of `batch_size` and persist them in order
    ///
    /// Batch ids count up from `first_batch`. Ingestion stops at the first
    /// batch that fails to persist; the summary names it so the caller can
    /// retry from there.
    ///
    /// # Errors
    ///
    /// `Validation` if a chunk fails validation; earlier chunks stay committed.
    pub fn ingest<I>(&mut self, documents: I, first_batch: BatchId) -> Result<IngestSummary>
    where
        I: IntoIterator<Item = Document>,
    {
        let batch_size = self.config.batch_size;
        let mut summary = IngestSummary {
            batches: 0,
            persisted: 0,
            next_batch: first_batch,
            failed: None,
        };
        let mut chunk = Vec::with_capacity(batch_size);

        for doc in documents {
            chunk.push(doc);
            if chunk.len() == batch_size && !self.ingest_chunk(&mut chunk, &mut summary)? {
                return Ok(summary);
            }
        }
        if !chunk.is_empty() {
            self.ingest_chunk(&mut chunk, &mut summary)?;
        }

        info!(
            target: "docsink::writer",
            batches = summary.batches,
            persisted = summary.persisted,
            next_batch = %summary.next_batch,
            "Ingestion finished"
        );
        Ok(summary)
    }

    /// Persist one chunk; false means ingestion must stop
    fn ingest_chunk(&mut self, chunk: &mut Vec<Document>, summary: &mut IngestSummary) -> Result<bool> {
        let batch_id = summary.next_batch.to_string();
        let result = self.process_batch(chunk, &batch_id)?;
        if !result.success {
            summary.failed = Some(result);
            return Ok(false);
        }
        summary.batches += 1;
        summary.persisted += result.persisted_count as u64;
        summary.next_batch = summary
            .next_batch
            .next()
            .ok_or_else(|| Error::validation("batch id sequence exhausted"))?;
        chunk.clear();
        Ok(true)
    }

    fn validate(&self, documents: &[Document], batch_id: &str) -> Result<()> {
        if documents.is_empty() {
            return Err(Error::validation("Batch cannot be empty"));
        }
        let id = self.parse_batch_id(batch_id)?;
        if self.is_known(batch_id, &id) {
            return Err(Error::validation("Batch ID already exists"));
        }
        self.check_order(&id)?;
        validate_batch(documents)
    }

    fn parse_batch_id(&self, batch_id: &str) -> Result<BatchId> {
        BatchId::parse(batch_id)
            .filter(|id| id.prefix() == self.config.batch_prefix)
            .ok_or_else(|| Error::validation(format!("Invalid batch ID: {batch_id:?}")))
    }

    fn is_known(&self, batch_id: &str, id: &BatchId) -> bool {
        self.processed.contains(batch_id)
            || self.pending.contains_key(batch_id)
            || self.committed_mark.as_ref().is_some_and(|mark| mark.covers(id))
    }

    /// Latest committed batch known to this writer
    fn last_committed(&self) -> Option<BatchId> {
        self.checkpoints
            .latest()
            .and_then(|cp| BatchId::parse(&cp.last_batch_id))
            .or_else(|| self.committed_mark.clone())
    }

    fn check_order(&self, id: &BatchId) -> Result<()> {
        match self.last_committed() {
            Some(last) if id.number() <= last.number() => Err(Error::validation(format!(
                "Batch ID out of order: {id} is not after {last}"
            ))),
            _ => Ok(()),
        }
    }

    /// Retry an outstanding rollback
    fn roll_back_orphan(&mut self) -> Result<()> {
        if let Some(batch_id) = self.orphaned.clone() {
            let removed = self.store.discard_batch(&batch_id)?;
            info!(target: "docsink::writer", batch_id = %batch_id, removed, "Orphaned batch rolled back");
            self.orphaned = None;
        }
        Ok(())
    }

    fn roll_back(&mut self, batch_id: &str) {
        match self.store.discard_batch(batch_id) {
            Ok(removed) => {
                warn!(target: "docsink::writer", batch_id, removed, "Rolled back uncheckpointed batch");
            }
            Err(e) => {
                warn!(
                    target: "docsink::writer",
                    batch_id,
                    error = %e,
                    "Rollback failed, blocking writes until it succeeds"
                );
                self.orphaned = Some(batch_id.to_string());
            }
        }
    }

    fn persist(&mut self, documents: &[Document], batch_id: &str) -> BatchResult {
        if let Err(error) = self.roll_back_orphan() {
            warn!(target: "docsink::writer", batch_id, error = %error, "Orphaned batch still present");
            return BatchResult::failed(batch_id, &error);
        }
        if let Err(e) = self.store.insert_documents(documents, batch_id) {
            let error = Error::from(e);
            warn!(target: "docsink::writer", batch_id, error = %error, "Batch insert failed");
            return BatchResult::failed(batch_id, &error);
        }

        let count = documents.len();
        if let Err(error) = self.checkpoints.update_checkpoint(
            batch_id,
            count as i64,
            None,
            self.config.verify_db_state,
        ) {
            warn!(
                target: "docsink::writer",
                batch_id,
                error = %error,
                "Checkpoint update failed after insert"
            );
            self.roll_back(batch_id);
            return BatchResult::failed(batch_id, &error);
        }

        self.processed.insert(batch_id.to_string());
        info!(target: "docsink::writer", batch_id, count, "Batch committed");
        BatchResult::committed(batch_id, count)
    }
}

impl std::fmt::Debug for StreamingBatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingBatchWriter")
            .field("config", &self.config)
            .field("processed", &self.processed.len())
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("committed_mark", &self.committed_mark)
            .field("orphaned", &self.orphaned)
            .finish()
    }
}
