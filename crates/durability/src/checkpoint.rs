//! Checkpoint management
//!
//! The [`CheckpointManager`] owns the cumulative persisted-document count.
//! Each update adds one batch's count to the previous total and appends a new
//! record to the storage ledger.
//!
//! # Prior total
//!
//! The previous cumulative value is taken from, in order:
//! 1. the last checkpoint written by this manager (session memory)
//! 2. the latest checkpoint record in storage
//! 3. zero
//!
//! Step 2 is what lets a freshly started process continue the count without
//! replaying history.
//!
//! # Ordering
//!
//! The session lock is held from reading the prior total until the new
//! record is in the session list, so updates apply in call order. Storage is
//! expected to serialize ledger writes; a concurrent writer shows up as
//! [`StorageError::Conflict`] and is reported as [`Error::Conflict`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use docsink_core::{
    strip_partial, Checkpoint, ConsistencyReport, DocumentStore, Error, RecoveryPoint, Result,
    StorageError,
};

use crate::config::IngestConfig;
use crate::snapshot::SnapshotWriter;

/// Tracks and persists cumulative checkpoints
pub struct CheckpointManager {
    store: Arc<dyn DocumentStore>,
    snapshot: Option<SnapshotWriter>,
    session: Mutex<Vec<Checkpoint>>,
}

impl CheckpointManager {
    /// Create a manager with no local snapshot
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        CheckpointManager {
            store,
            snapshot: None,
            session: Mutex::new(Vec::new()),
        }
    }

    /// Mirror every checkpoint to a local snapshot file
    pub fn with_snapshot(mut self, snapshot: SnapshotWriter) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Create a manager from ingestion config
    ///
    /// Opens the snapshot writer when `snapshot_path` is set and removes any
    /// temporary file a previous crash left behind.
    pub fn from_config(store: Arc<dyn DocumentStore>, config: &IngestConfig) -> Result<Self> {
        let manager = CheckpointManager::new(store);
        match &config.snapshot_path {
            Some(path) => {
                let writer = SnapshotWriter::new(path)?;
                if writer.cleanup_temp_files()? {
                    debug!(
                        target: "docsink::checkpoint",
                        path = %writer.temp_path().display(),
                        "Removed stale snapshot temp file"
                    );
                }
                Ok(manager.with_snapshot(writer))
            }
            None => Ok(manager),
        }
    }

    /// The storage collaborator
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The local snapshot writer, if enabled
    pub fn snapshot(&self) -> Option<&SnapshotWriter> {
        self.snapshot.as_ref()
    }

    /// Last checkpoint written this session
    pub fn latest(&self) -> Option<Checkpoint> {
        self.session.lock().last().cloned()
    }

    /// Every checkpoint written this session, oldest first
    pub fn session_checkpoints(&self) -> Vec<Checkpoint> {
        self.session.lock().clone()
    }

    /// Record that `batch_id` added `persisted_count` documents
    ///
    /// # Errors
    ///
    /// - `Validation` if `persisted_count` is negative, or `batch_id` is empty
    ///   or tagged `_partial`
    /// - `CorruptCheckpoint` if the prior total has to come from a storage
    ///   record that fails validation
    /// - `Conflict` if storage reports a concurrent ledger write
    /// - `Storage` for any other storage failure
    ///
    /// On error nothing is appended to the session.
    pub fn update_checkpoint(
        &self,
        batch_id: &str,
        persisted_count: i64,
        metadata: Option<Value>,
        verify_db_state: bool,
    ) -> Result<Checkpoint> {
        let added = u64::try_from(persisted_count)
            .map_err(|_| Error::validation("persisted_count must be non-negative"))?;
        if batch_id.is_empty() || strip_partial(batch_id).1 {
            return Err(Error::validation(format!(
                "batch_id cannot be committed: {batch_id:?}"
            )));
        }

        let mut session = self.session.lock();

        let prior = match session.last() {
            Some(checkpoint) => checkpoint.total_persisted,
            None => match self.store.latest_checkpoint()? {
                Some(record) => RecoveryPoint::from_record(&record)?.total_persisted,
                None => 0,
            },
        };
        let total = prior
            .checked_add(added)
            .ok_or_else(|| Error::validation("total_persisted overflow"))?;

        let mut checkpoint = Checkpoint::committed(batch_id, total);
        checkpoint.metadata = metadata;
        if verify_db_state {
            checkpoint.db_count_matches = self.count_matches(total);
        }

        self.store
            .save_checkpoint(&checkpoint.to_record())
            .map_err(|e| match e {
                StorageError::Conflict(msg) => Error::Conflict(msg),
                other => Error::Storage(other),
            })?;
        session.push(checkpoint.clone());
        drop(session);

        if let Some(snapshot) = &self.snapshot {
            // Storage already holds the record; the mirror only lags behind
            if let Err(e) = snapshot.write(&checkpoint) {
                warn!(
                    target: "docsink::checkpoint",
                    batch_id,
                    error = %e,
                    "Checkpoint snapshot write failed"
                );
            }
        }

        info!(
            target: "docsink::checkpoint",
            batch_id,
            added,
            total_persisted = total,
            db_count_matches = checkpoint.db_count_matches,
            "Checkpoint updated"
        );
        Ok(checkpoint)
    }

    /// Where processing should resume
    ///
    /// Reads the latest storage record, falling back to this session's last
    /// checkpoint when storage has none.
    pub fn get_recovery_point(&self) -> Result<RecoveryPoint> {
        Ok(self.current_point()?.unwrap_or_else(RecoveryPoint::fresh))
    }

    /// Compare the checkpointed total against storage's document count
    ///
    /// With no checkpoint at all there is nothing to disagree with, so the
    /// report is consistent.
    pub fn verify_consistency(&self) -> Result<ConsistencyReport> {
        let Some(point) = self.current_point()? else {
            return Ok(ConsistencyReport::consistent());
        };
        let db_count = self.store.document_count()?;
        let report = ConsistencyReport::compare(point.total_persisted, db_count);
        if !report.consistent {
            warn!(
                target: "docsink::checkpoint",
                checkpoint_total = point.total_persisted,
                db_count,
                "Checkpoint and storage disagree"
            );
        }
        Ok(report)
    }

    fn current_point(&self) -> Result<Option<RecoveryPoint>> {
        if let Some(record) = self.store.latest_checkpoint()? {
            return RecoveryPoint::from_record(&record).map(Some);
        }
        Ok(self.latest().as_ref().map(RecoveryPoint::from_checkpoint))
    }

    fn count_matches(&self, total: u64) -> bool {
        match self.store.document_count() {
            Ok(db_count) if db_count == total => true,
            Ok(db_count) => {
                warn!(
                    target: "docsink::checkpoint",
                    total_persisted = total,
                    db_count,
                    "Document count mismatch"
                );
                false
            }
            Err(e) => {
                warn!(target: "docsink::checkpoint", error = %e, "Could not verify document count");
                false
            }
        }
    }
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("snapshot", &self.snapshot)
            .field("session_len", &self.session.lock().len())
            .finish()
    }
}
