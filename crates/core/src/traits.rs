//! Storage collaborator abstraction
//!
//! Checkpointing, batch writing, and recovery are written against the
//! narrow [`DocumentStore`] trait rather than a concrete engine, so a
//! different backing store can be substituted without touching them.
//!
//! Thread safety: implementations must be `Send + Sync`. The ingestion
//! components assume a single logical writer; a store that can be shared by
//! several writers must serialise checkpoint writes and report a race as
//! [`StorageError::Conflict`](crate::error::StorageError::Conflict).

use std::sync::Arc;

use serde_json::Value;

use crate::document::Document;
use crate::error::StorageResult;

/// Durable record store used by the ingestion pipeline
pub trait DocumentStore: Send + Sync {
    /// Durably persist `documents`, each tagged with `batch_id`, in one operation
    ///
    /// All documents are written or none are. Fails with
    /// `StorageError::DuplicateDocument` if any identifier already exists.
    fn insert_documents(&self, documents: &[Document], batch_id: &str) -> StorageResult<()>;

    /// Total number of documents currently persisted
    fn document_count(&self) -> StorageResult<u64>;

    /// Append a checkpoint record to the ledger
    ///
    /// Returns `StorageError::Conflict` if a concurrent write was detected.
    fn save_checkpoint(&self, record: &Value) -> StorageResult<()>;

    /// Most recently appended checkpoint record, unvalidated
    fn latest_checkpoint(&self) -> StorageResult<Option<Value>>;

    /// Whether any documents belong to a batch beyond (or not conforming to)
    /// the last checkpointed batch
    ///
    /// See [`is_partial_batch`](crate::batch_id::is_partial_batch) for the
    /// classification rules.
    fn has_partial_batch(&self) -> StorageResult<bool>;

    /// Delete the documents of partial batches, returning how many were removed
    fn discard_partial_batch(&self) -> StorageResult<u64>;

    /// Delete every document tagged `batch_id`, returning how many were removed
    ///
    /// Rolls back a batch whose documents were stored but whose checkpoint
    /// could not be written. Does not consult the checkpoint ledger.
    fn discard_batch(&self, batch_id: &str) -> StorageResult<u64>;

    /// Liveness check
    ///
    /// `Ok(())` when the store is reachable; the error describes why not.
    fn check_connection(&self) -> StorageResult<()>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn insert_documents(&self, documents: &[Document], batch_id: &str) -> StorageResult<()> {
        (**self).insert_documents(documents, batch_id)
    }

    fn document_count(&self) -> StorageResult<u64> {
        (**self).document_count()
    }

    fn save_checkpoint(&self, record: &Value) -> StorageResult<()> {
        (**self).save_checkpoint(record)
    }

    fn latest_checkpoint(&self) -> StorageResult<Option<Value>> {
        (**self).latest_checkpoint()
    }

    fn has_partial_batch(&self) -> StorageResult<bool> {
        (**self).has_partial_batch()
    }

    fn discard_partial_batch(&self) -> StorageResult<u64> {
        (**self).discard_partial_batch()
    }

    fn discard_batch(&self, batch_id: &str) -> StorageResult<u64> {
        (**self).discard_batch(batch_id)
    }

    fn check_connection(&self) -> StorageResult<()> {
        (**self).check_connection()
    }
}
