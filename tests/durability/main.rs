//! Integration tests for the ingestion protocol.
//!
//! These tests exercise checkpointing, batch writing, and recovery through the
//! public `docsink` facade, against both the in-memory and the SQLite store,
//! including simulated restarts (open → write → crash → reopen → recover).
//!
//! Unit tests in crates/*/src cover each component in isolation. These
//! integration tests cover the end-to-end guarantees.

#[path = "../common/mod.rs"]
mod common;

mod crash_recovery;
mod scenarios;
mod snapshot_lifecycle;
mod stress;
