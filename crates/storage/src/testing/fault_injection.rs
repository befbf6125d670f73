//! Fault injection wrapper for storage collaborators
//!
//! Failure points are armed and healed at runtime, so a single test can walk
//! a store through an outage and back.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use docsink_core::{Document, DocumentStore, StorageError, StorageResult};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `insert_documents` fails without writing anything
    Insert,
    /// `insert_documents` writes the first `keep` documents, then fails
    TornInsert {
        /// Documents written before the failure
        keep: usize,
    },
    /// `save_checkpoint` fails with a generic backend error
    SaveCheckpoint,
    /// `save_checkpoint` fails with the structured conflict signal
    Conflict,
    /// `check_connection` reports the store unreachable
    Connection,
    /// `document_count` fails
    Count,
    /// `latest_checkpoint` fails
    LatestCheckpoint,
    /// `discard_partial_batch` and `discard_batch` fail
    Discard,
}

impl FailPoint {
    /// Get description of the failure
    pub fn description(&self) -> &'static str {
        match self {
            FailPoint::Insert => "insert failed",
            FailPoint::TornInsert { .. } => "insert interrupted",
            FailPoint::SaveCheckpoint => "checkpoint write failed",
            FailPoint::Conflict => "checkpoint ledger advanced by another writer",
            FailPoint::Connection => "connection refused",
            FailPoint::Count => "count query failed",
            FailPoint::LatestCheckpoint => "checkpoint read failed",
            FailPoint::Discard => "discard failed",
        }
    }
}

/// A store that fails on demand
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    armed: Mutex<HashSet<FailPoint>>,
}

impl<S: DocumentStore> FaultyStore<S> {
    /// Wrap a store with no failures armed
    pub fn new(inner: S) -> Self {
        FaultyStore {
            inner,
            armed: Mutex::new(HashSet::new()),
        }
    }

    /// Arm a failure point
    pub fn fail(&self, point: FailPoint) {
        debug!(target: "docsink::storage", ?point, "Armed fail point");
        self.armed.lock().insert(point);
    }

    /// Disarm a failure point
    pub fn heal(&self, point: FailPoint) {
        self.armed.lock().remove(&point);
    }

    /// Disarm every failure point
    pub fn heal_all(&self) {
        self.armed.lock().clear();
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn tripped(&self, point: FailPoint) -> StorageResult<()> {
        if self.armed.lock().contains(&point) {
            Err(StorageError::backend(point.description()))
        } else {
            Ok(())
        }
    }

    fn torn_insert(&self) -> Option<usize> {
        self.armed.lock().iter().find_map(|p| match p {
            FailPoint::TornInsert { keep } => Some(*keep),
            _ => None,
        })
    }
}

impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    fn insert_documents(&self, documents: &[Document], batch_id: &str) -> StorageResult<()> {
        self.tripped(FailPoint::Insert)?;
        if let Some(keep) = self.torn_insert() {
            let keep = keep.min(documents.len());
            if keep > 0 {
                self.inner.insert_documents(&documents[..keep], batch_id)?;
            }
            return Err(StorageError::backend(
                FailPoint::TornInsert { keep }.description(),
            ));
        }
        self.inner.insert_documents(documents, batch_id)
    }

    fn document_count(&self) -> StorageResult<u64> {
        self.tripped(FailPoint::Count)?;
        self.inner.document_count()
    }

    fn save_checkpoint(&self, record: &Value) -> StorageResult<()> {
        if self.armed.lock().contains(&FailPoint::Conflict) {
            return Err(StorageError::Conflict(
                FailPoint::Conflict.description().to_string(),
            ));
        }
        self.tripped(FailPoint::SaveCheckpoint)?;
        self.inner.save_checkpoint(record)
    }

    fn latest_checkpoint(&self) -> StorageResult<Option<Value>> {
        self.tripped(FailPoint::LatestCheckpoint)?;
        self.inner.latest_checkpoint()
    }

    fn has_partial_batch(&self) -> StorageResult<bool> {
        self.inner.has_partial_batch()
    }

    fn discard_partial_batch(&self) -> StorageResult<u64> {
        self.tripped(FailPoint::Discard)?;
        self.inner.discard_partial_batch()
    }

    fn discard_batch(&self, batch_id: &str) -> StorageResult<u64> {
        self.tripped(FailPoint::Discard)?;
        self.inner.discard_batch(batch_id)
    }

    fn check_connection(&self) -> StorageResult<()> {
        if self.armed.lock().contains(&FailPoint::Connection) {
            return Err(StorageError::Unavailable(
                FailPoint::Connection.description().to_string(),
            ));
        }
        self.inner.check_connection()
    }
}
