//! Core types and traits for docsink
//!
//! This crate defines the vocabulary shared by the storage and durability
//! crates:
//! - BatchId: the `<prefix>_<zero-padded integer>` wire format and partial-batch rules
//! - Document: a record submitted for ingestion
//! - Checkpoint / RecoveryPoint / ConsistencyReport: the checkpoint ledger and
//!   what is derived from it
//! - Error / StorageError: error type hierarchy
//! - DocumentStore: the storage collaborator trait

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch_id;
pub mod checkpoint;
pub mod document;
pub mod error;
pub mod traits;

pub use batch_id::{
    batch_number, is_partial_batch, next_batch_id, strip_partial, BatchId, PARTIAL_SUFFIX,
};
pub use checkpoint::{Checkpoint, CheckpointStatus, ConsistencyReport, RecoveryPoint};
pub use document::{validate_batch, Document};
pub use error::{Error, Result, StorageError, StorageResult};
pub use traits::DocumentStore;
