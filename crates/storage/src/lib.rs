//! Storage layer for docsink
//!
//! This crate implements the [`DocumentStore`](docsink_core::DocumentStore)
//! collaborator with:
//! - MemoryStore: BTreeMap-based store under a `parking_lot::RwLock`
//! - SqliteStore: durable store on SQLite with a recovery log
//! - testing::FaultyStore: fault injection for crash and outage tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod sqlite;
pub mod testing;

pub use memory::MemoryStore;
pub use sqlite::{RecoveryLogEntry, SqliteStore};
