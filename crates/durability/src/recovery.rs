//! Crash recovery
//!
//! Recovery runs at process start, before any new batch is written:
//!
//! 1. Probe storage liveness
//! 2. Read the recovery point from the checkpoint ledger
//! 3. No checkpoint: fresh start (orphaned documents are discarded)
//! 4. Derive the committed batch count from the last batch id
//! 5. Discard documents of partially written batches
//! 6. Report where to resume
//!
//! ```text
//! Start ─┬─► StorageUnavailable          (fail)
//!        ├─► CorruptCheckpoint           (fail)
//!        ├─► FreshStart                  (success, nothing to resume)
//!        └─► [partial discarded] ─► Resumable (success)
//! ```
//!
//! # Recovery Properties
//!
//! - **Total**: [`CrashRecoveryHandler::recover`] never returns an error; every
//!   failure becomes a [`RecoveryResult`] with `success == false`
//! - **Idempotent**: a second run with no writes in between reports the same
//!   resume point and discards nothing
//! - **No retries**: a failed recovery is reported once; retrying is up to the
//!   caller

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use docsink_core::{DocumentStore, Error, RecoveryPoint, Result, StorageError};

use crate::checkpoint::CheckpointManager;

/// Terminal state of a recovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Liveness check failed
    StorageUnavailable,
    /// Checkpoint record failed validation
    CorruptCheckpoint,
    /// No checkpoint; start from the first batch
    FreshStart,
    /// Checkpoint found; resume after it
    Resumable,
    /// Any other failure during recovery
    Failed,
}

impl RecoveryOutcome {
    /// State label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryOutcome::StorageUnavailable => "storage_unavailable",
            RecoveryOutcome::CorruptCheckpoint => "corrupt_checkpoint",
            RecoveryOutcome::FreshStart => "fresh_start",
            RecoveryOutcome::Resumable => "resumable",
            RecoveryOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CrashRecoveryHandler::recover`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryResult {
    /// True if recovery completed
    pub success: bool,
    /// Batches committed before the crash (numeric suffix of the last id)
    pub recovered_batches: u64,
    /// Next batch to process
    pub resume_from: Option<String>,
    /// Documents lost; `None` when it cannot be determined
    pub data_loss: Option<u64>,
    /// True if documents of a partial batch were removed
    pub partial_batch_discarded: bool,
    /// Failure message
    pub error: Option<String>,
    /// True if a committed checkpoint was found
    pub can_resume: bool,
    /// Last committed batch
    pub last_batch_id: Option<String>,
    /// Cumulative persisted documents at the last committed batch
    pub total_persisted: u64,
    /// Documents removed while discarding partial batches
    pub discarded_documents: u64,
    /// Terminal state
    pub outcome: RecoveryOutcome,
}

impl RecoveryResult {
    fn failure(outcome: RecoveryOutcome, error: String) -> Self {
        RecoveryResult {
            success: false,
            recovered_batches: 0,
            resume_from: None,
            data_loss: None,
            partial_batch_discarded: false,
            error: Some(error),
            can_resume: false,
            last_batch_id: None,
            total_persisted: 0,
            discarded_documents: 0,
            outcome,
        }
    }

    /// Recovery point the caller should hand to the batch writer
    pub fn recovery_point(&self) -> RecoveryPoint {
        RecoveryPoint {
            last_batch_id: self.last_batch_id.clone(),
            total_persisted: self.total_persisted,
            can_resume: self.can_resume,
        }
    }
}

/// Overall integrity verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityLevel {
    /// Checkpoint and storage agree
    Full,
    /// Counts disagree
    Partial,
    /// The check itself failed
    Corrupt,
}

impl IntegrityLevel {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityLevel::Full => "full",
            IntegrityLevel::Partial => "partial",
            IntegrityLevel::Corrupt => "corrupt",
        }
    }
}

impl fmt::Display for IntegrityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CrashRecoveryHandler::validate_integrity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// True if the check ran to completion
    pub success: bool,
    /// Verdict
    pub integrity: IntegrityLevel,
    /// Discrepancies or the error that stopped the check
    pub issues: Vec<String>,
}

/// Determines the resume point after a crash and cleans up partial batches
pub struct CrashRecoveryHandler {
    checkpoints: Arc<CheckpointManager>,
}

impl CrashRecoveryHandler {
    /// Create a handler over a checkpoint manager
    pub fn new(checkpoints: Arc<CheckpointManager>) -> Self {
        CrashRecoveryHandler { checkpoints }
    }

    /// The checkpoint manager
    pub fn checkpoints(&self) -> &Arc<CheckpointManager> {
        &self.checkpoints
    }

    /// Run recovery
    ///
    /// Never fails: storage outages, corrupt checkpoints, and any other error
    /// are reported through the result.
    pub fn recover(&self) -> RecoveryResult {
        let result = match self.try_recover() {
            Ok(result) => result,
            Err(Error::StorageUnavailable(msg)) => RecoveryResult::failure(
                RecoveryOutcome::StorageUnavailable,
                format!("storage unavailable: {msg}"),
            ),
            Err(Error::CorruptCheckpoint(msg)) => RecoveryResult::failure(
                RecoveryOutcome::CorruptCheckpoint,
                format!("corrupt checkpoint: {msg}"),
            ),
            Err(e) => RecoveryResult::failure(RecoveryOutcome::Failed, e.to_string()),
        };

        if result.success {
            info!(
                target: "docsink::recovery",
                outcome = %result.outcome,
                recovered_batches = result.recovered_batches,
                resume_from = ?result.resume_from,
                partial_batch_discarded = result.partial_batch_discarded,
                discarded_documents = result.discarded_documents,
                "Recovery complete"
            );
        } else {
            warn!(
                target: "docsink::recovery",
                outcome = %result.outcome,
                error = ?result.error,
                "Recovery failed"
            );
        }
        result
    }

    fn try_recover(&self) -> Result<RecoveryResult> {
        let store = self.checkpoints.store();

        // Step 1: liveness
        store.check_connection().map_err(|e| match e {
            StorageError::Unavailable(msg) => Error::StorageUnavailable(msg),
            other => Error::StorageUnavailable(other.to_string()),
        })?;

        // Step 2: recovery point
        let point = self.checkpoints.get_recovery_point()?;

        // Without a batch id every stored document would be classified as
        // partial; a ledger that still counts documents must not be wiped.
        if !point.can_resume && point.total_persisted > 0 {
            return Err(Error::corrupt(format!(
                "checkpoint records {} documents but names no batch",
                point.total_persisted
            )));
        }

        // Steps 3 and 5: documents with no committed checkpoint behind them
        let discarded_documents = discard_partial(&**store)?;
        let partial_batch_discarded = discarded_documents > 0;

        if !point.can_resume {
            return Ok(RecoveryResult {
                success: true,
                recovered_batches: 0,
                resume_from: None,
                data_loss: Some(0),
                partial_batch_discarded,
                error: None,
                can_resume: false,
                last_batch_id: None,
                total_persisted: point.total_persisted,
                discarded_documents,
                outcome: RecoveryOutcome::FreshStart,
            });
        }

        // Step 4: committed batches
        let recovered_batches = point.committed_batches();

        Ok(RecoveryResult {
            success: true,
            recovered_batches,
            resume_from: point.resume_from(),
            data_loss: Some(0),
            partial_batch_discarded,
            error: None,
            can_resume: true,
            last_batch_id: point.last_batch_id,
            total_persisted: point.total_persisted,
            discarded_documents,
            outcome: RecoveryOutcome::Resumable,
        })
    }

    /// Check the checkpoint against storage
    ///
    /// Never fails; an error during the check is reported as
    /// [`IntegrityLevel::Corrupt`].
    pub fn validate_integrity(&self) -> IntegrityReport {
        match self.checkpoints.verify_consistency() {
            Ok(report) if report.consistent => IntegrityReport {
                success: true,
                integrity: IntegrityLevel::Full,
                issues: Vec::new(),
            },
            Ok(report) => IntegrityReport {
                success: true,
                integrity: IntegrityLevel::Partial,
                issues: report.discrepancies,
            },
            Err(e) => {
                warn!(target: "docsink::recovery", error = %e, "Integrity check failed");
                IntegrityReport {
                    success: false,
                    integrity: IntegrityLevel::Corrupt,
                    issues: vec![e.to_string()],
                }
            }
        }
    }
}

impl fmt::Debug for CrashRecoveryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashRecoveryHandler")
            .field("checkpoints", &self.checkpoints)
            .finish()
    }
}

fn discard_partial(store: &dyn DocumentStore) -> Result<u64> {
    if !store.has_partial_batch()? {
        return Ok(0);
    }
    let removed = store.discard_partial_batch()?;
    warn!(target: "docsink::recovery", removed, "Discarded partial batch");
    Ok(removed)
}
