//! Snapshot Lifecycle Tests
//!
//! The local snapshot mirrors the latest checkpoint and survives restarts.

use docsink::{load_snapshot, CheckpointStatus, SnapshotWriter};

use crate::common::*;

#[test]
fn snapshot_tracks_latest_checkpoint() {
    let ts = TestStore::sqlite();
    let config = IngestConfig::for_testing().with_snapshot_path(ts.snapshot_path());

    let mut ingestor = Ingestor::open(ts.store.clone(), config).unwrap();
    ingestor.ingest(docs("a", 25)).unwrap();

    let snapshot = load_snapshot(&ts.snapshot_path()).unwrap().unwrap();
    assert_eq!(snapshot.last_batch_id, "batch_003");
    assert_eq!(snapshot.total_persisted, 25);
    assert_eq!(snapshot.status, CheckpointStatus::Committed);
    assert!(snapshot.db_count_matches);

    // The mirror agrees with the ledger
    let ledger = ingestor.checkpoints().get_recovery_point().unwrap();
    assert_eq!(ledger.last_batch_id.as_deref(), Some("batch_003"));
    assert_eq!(ledger.total_persisted, snapshot.total_persisted);
}

#[test]
fn snapshot_survives_restart() {
    let mut ts = TestStore::sqlite();
    let config = IngestConfig::for_testing().with_snapshot_path(ts.snapshot_path());
    {
        let mut ingestor = Ingestor::open(ts.store.clone(), config.clone()).unwrap();
        ingestor.ingest(docs("a", 10)).unwrap();
    }

    // A crash mid-rename leaves a temp file behind
    let writer = SnapshotWriter::new(ts.snapshot_path()).unwrap();
    std::fs::write(writer.temp_path(), b"{\"last_batch_id\":").unwrap();
    ts.restart();

    let mut ingestor = Ingestor::open(ts.store.clone(), config).unwrap();
    assert!(!writer.temp_file_exists());
    assert_eq!(writer.load().unwrap().unwrap().last_batch_id, "batch_001");

    ingestor.ingest(docs("b", 10)).unwrap();
    let snapshot = writer.load().unwrap().unwrap();
    assert_eq!(snapshot.last_batch_id, "batch_002");
    assert_eq!(snapshot.total_persisted, 20);
}

#[test]
fn snapshot_failure_does_not_fail_checkpoint() {
    let ts = TestStore::memory();
    let snapshot_dir = ts.dir.path().join("state");
    let config = IngestConfig::default().with_snapshot_path(snapshot_dir.join("checkpoint.json"));
    let checkpoints = CheckpointManager::from_config(ts.store.clone(), &config).unwrap();

    // Make the snapshot location unwritable by replacing the directory with a file
    std::fs::remove_dir_all(&snapshot_dir).unwrap();
    std::fs::write(&snapshot_dir, b"not a directory").unwrap();

    let cp = checkpoints.update_checkpoint("batch_001", 5, None, false).unwrap();
    assert_eq!(cp.total_persisted, 5);
    assert_eq!(
        checkpoints.get_recovery_point().unwrap().last_batch_id.as_deref(),
        Some("batch_001")
    );
}
