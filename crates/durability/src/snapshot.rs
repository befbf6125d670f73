//! Crash-safe local checkpoint snapshot
//!
//! Mirrors the latest checkpoint to a single JSON file next to the process,
//! so an operator (or a later process) can see the resume point without
//! opening the store.
//!
//! # Crash Safety
//!
//! Each write follows the write-fsync-rename pattern:
//! 1. Write to a temporary file (`<name>.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to the final path
//! 4. fsync the parent directory
//!
//! A reader therefore sees either the previous snapshot or the new one,
//! never a half-written file.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use docsink_core::{Checkpoint, Result};

/// Snapshot writer with crash-safe semantics
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    /// Create a snapshot writer for `path`
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(parent_dir(&path))?;
        Ok(SnapshotWriter { path })
    }

    /// Final snapshot path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary path used while writing
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("checkpoint"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write a checkpoint using the crash-safe pattern
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        let temp_path = self.temp_path();

        // Step 1: Write to temporary file
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;

        // Step 2: fsync the file
        file.sync_all()?;
        drop(file);

        // Step 3: Atomic rename
        std::fs::rename(&temp_path, &self.path)?;

        // Step 4: fsync parent directory
        let dir = File::open(parent_dir(&self.path))?;
        dir.sync_all()?;

        debug!(
            target: "docsink::checkpoint",
            path = %self.path.display(),
            last_batch_id = %checkpoint.last_batch_id,
            "Checkpoint snapshot written"
        );
        Ok(())
    }

    /// Read the snapshot back, if one exists
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        load_snapshot(&self.path)
    }

    /// Remove a temporary file left behind by a crash
    ///
    /// Returns true if one was removed.
    pub fn cleanup_temp_files(&self) -> io::Result<bool> {
        match std::fs::remove_file(self.temp_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if a temporary file exists
    pub fn temp_file_exists(&self) -> bool {
        self.temp_path().exists()
    }
}

/// Read a checkpoint snapshot from `path`
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_snapshot(path: &Path) -> Result<Option<Checkpoint>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
    Ok(Some(checkpoint))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsink_core::CheckpointStatus;

    #[test]
    fn test_write_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path().join("checkpoint.json")).unwrap();

        let checkpoint = Checkpoint::committed("batch_004", 400);
        writer.write(&checkpoint).unwrap();

        let loaded = writer.load().unwrap().unwrap();
        assert_eq!(loaded.last_batch_id, "batch_004");
        assert_eq!(loaded.total_persisted, 400);
        assert_eq!(loaded.status, CheckpointStatus::Committed);
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn test_snapshot_file_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path().join("checkpoint.json")).unwrap();
        writer.write(&Checkpoint::committed("batch_001", 100)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(writer.path()).unwrap()).unwrap();
        assert_eq!(raw["last_batch_id"], "batch_001");
        assert_eq!(raw["total_persisted"], 100);
        assert_eq!(raw["status"], "committed");
        assert_eq!(raw["db_count_matches"], false);
        assert!(raw["timestamp"].is_string());
    }

    #[test]
    fn test_no_temp_file_after_success() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path().join("checkpoint.json")).unwrap();
        writer.write(&Checkpoint::committed("batch_001", 1)).unwrap();
        assert!(!writer.temp_file_exists());
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path().join("checkpoint.json")).unwrap();
        for i in 1..=3u64 {
            writer
                .write(&Checkpoint::committed(format!("batch_{i:03}"), i * 10))
                .unwrap();
        }
        let loaded = writer.load().unwrap().unwrap();
        assert_eq!(loaded.last_batch_id, "batch_003");
        assert_eq!(loaded.total_persisted, 30);
    }

    #[test]
    fn test_stale_temp_file_does_not_block_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path().join("checkpoint.json")).unwrap();

        // Simulate a crash between step 1 and step 3
        std::fs::write(writer.temp_path(), b"{\"last_batch_id\": \"batch_0").unwrap();
        assert!(writer.load().unwrap().is_none());

        writer.write(&Checkpoint::committed("batch_001", 5)).unwrap();
        assert_eq!(writer.load().unwrap().unwrap().total_persisted, 5);
    }

    #[test]
    fn test_cleanup_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path().join("checkpoint.json")).unwrap();

        std::fs::write(writer.temp_path(), b"partial").unwrap();
        assert!(writer.cleanup_temp_files().unwrap());
        assert!(!writer.temp_file_exists());
        assert!(!writer.cleanup_temp_files().unwrap());
    }

    #[test]
    fn test_creates_parent_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state").join("checkpoint.json");
        let writer = SnapshotWriter::new(&path).unwrap();
        writer.write(&Checkpoint::committed("batch_001", 1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&temp_dir.path().join("nope.json")).unwrap().is_none());
    }
}
