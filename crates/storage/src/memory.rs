//! MemoryStore: in-process storage backend
//!
//! This module implements the DocumentStore trait using:
//! - `BTreeMap<doc id, StoredDocument>` for ordered document storage
//! - `Vec<Value>` as the append-only checkpoint ledger
//! - one `parking_lot::RwLock` over both, so a batch insert is observed
//!   entirely or not at all
//!
//! Nothing survives the process, which makes this the store for tests and
//! for embedding where the host owns durability.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use docsink_core::{is_partial_batch, Document, DocumentStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Document,
    batch_id: String,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<String, StoredDocument>,
    checkpoints: Vec<Value>,
}

impl Inner {
    fn last_checkpointed_id(&self) -> Option<&str> {
        self.checkpoints
            .last()
            .and_then(|record| record.get("last_batch_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// In-memory document store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents tagged with `batch_id`, ordered by id
    pub fn documents_in_batch(&self, batch_id: &str) -> Vec<Document> {
        self.inner
            .read()
            .documents
            .values()
            .filter(|stored| stored.batch_id == batch_id)
            .map(|stored| stored.document.clone())
            .collect()
    }

    /// Distinct batch tags present in the store
    pub fn batch_ids(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .documents
            .values()
            .map(|stored| stored.batch_id.clone())
            .collect()
    }

    /// Remove documents by id, returning how many existed
    pub fn delete_documents(&self, ids: &[&str]) -> u64 {
        let mut inner = self.inner.write();
        ids.iter()
            .filter(|id| inner.documents.remove(**id).is_some())
            .count() as u64
    }

    /// Number of records in the checkpoint ledger
    pub fn checkpoint_count(&self) -> usize {
        self.inner.read().checkpoints.len()
    }
}

impl DocumentStore for MemoryStore {
    fn insert_documents(&self, documents: &[Document], batch_id: &str) -> StorageResult<()> {
        let mut inner = self.inner.write();

        // Check every id before writing any of them
        let mut incoming = HashSet::with_capacity(documents.len());
        for doc in documents {
            let id = doc
                .doc_id()
                .ok_or_else(|| StorageError::backend("document has no id"))?;
            if inner.documents.contains_key(id) || !incoming.insert(id) {
                return Err(StorageError::DuplicateDocument(id.to_string()));
            }
        }

        for doc in documents {
            if let Some(id) = doc.doc_id() {
                inner.documents.insert(
                    id.to_string(),
                    StoredDocument {
                        document: doc.clone(),
                        batch_id: batch_id.to_string(),
                    },
                );
            }
        }
        debug!(target: "docsink::storage", batch_id, count = documents.len(), "Inserted documents");
        Ok(())
    }

    fn document_count(&self) -> StorageResult<u64> {
        Ok(self.inner.read().documents.len() as u64)
    }

    fn save_checkpoint(&self, record: &Value) -> StorageResult<()> {
        self.inner.write().checkpoints.push(record.clone());
        Ok(())
    }

    fn latest_checkpoint(&self) -> StorageResult<Option<Value>> {
        Ok(self.inner.read().checkpoints.last().cloned())
    }

    fn has_partial_batch(&self) -> StorageResult<bool> {
        let inner = self.inner.read();
        let last = inner.last_checkpointed_id();
        Ok(inner
            .documents
            .values()
            .any(|stored| is_partial_batch(&stored.batch_id, last)))
    }

    fn discard_partial_batch(&self) -> StorageResult<u64> {
        let mut inner = self.inner.write();
        let last = inner.last_checkpointed_id().map(str::to_string);
        let before = inner.documents.len();
        inner
            .documents
            .retain(|_, stored| !is_partial_batch(&stored.batch_id, last.as_deref()));
        let removed = (before - inner.documents.len()) as u64;
        if removed > 0 {
            warn!(target: "docsink::storage", removed, last_batch_id = ?last, "Discarded partial batch documents");
        }
        Ok(removed)
    }

    fn discard_batch(&self, batch_id: &str) -> StorageResult<u64> {
        let mut inner = self.inner.write();
        let before = inner.documents.len();
        inner.documents.retain(|_, stored| stored.batch_id != batch_id);
        let removed = (before - inner.documents.len()) as u64;
        if removed > 0 {
            warn!(target: "docsink::storage", batch_id, removed, "Discarded batch documents");
        }
        Ok(removed)
    }

    fn check_connection(&self) -> StorageResult<()> {
        Ok(())
    }
}
