//! Crash Recovery Tests
//!
//! Simulates a process dying at each step of the batch protocol, restarts,
//! and verifies the recovered state and the resumed id sequence.

use crate::common::*;

#[test]
fn crash_after_insert_before_checkpoint() {
    init_tracing();
    for mut ts in TestStore::all() {
        {
            let mut ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
            let summary = ingestor.ingest(docs("first", 30)).unwrap();
            assert_eq!(summary.batches, 3);
        }

        // Process dies after inserting batch_004 but before its checkpoint
        ts.store.insert_documents(&docs("torn", 6), "batch_004").unwrap();
        ts.restart();

        let mut ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
        let recovered = ingestor.recovery().clone();
        assert_eq!(recovered.recovered_batches, 3);
        assert!(recovered.partial_batch_discarded);
        assert_eq!(recovered.discarded_documents, 6);
        assert_eq!(ingestor.next_batch().to_string(), "batch_004");
        assert_eq!(ts.count(), 30);

        // Retry the lost documents under the same id
        let summary = ingestor.ingest(docs("second", 10)).unwrap();
        assert!(summary.is_complete());
        assert_eq!(ts.count(), 40);
        assert_eq!(ingestor.checkpoints().latest().unwrap().last_batch_id, "batch_004");
        assert_eq!(ingestor.checkpoints().latest().unwrap().total_persisted, 40);
        assert_eq!(ingestor.validate_integrity().integrity, IntegrityLevel::Full);
    }
}

#[test]
fn crash_after_checkpoint() {
    for mut ts in TestStore::all() {
        {
            let mut ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
            ingestor.ingest(docs("a", 20)).unwrap();
        }
        ts.restart();

        let ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
        assert!(!ingestor.recovery().partial_batch_discarded);
        assert_eq!(ingestor.recovery().resume_from.as_deref(), Some("batch_003"));
        assert_eq!(ts.count(), 20);
    }
}

#[test]
fn crash_before_first_checkpoint() {
    for mut ts in TestStore::all() {
        ts.store.insert_documents(&docs("orphan", 8), "batch_001").unwrap();
        ts.restart();

        let ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
        assert_eq!(ingestor.recovery().outcome, RecoveryOutcome::FreshStart);
        assert!(ingestor.recovery().partial_batch_discarded);
        assert_eq!(ingestor.next_batch().to_string(), "batch_001");
        assert_eq!(ts.count(), 0);
    }
}

#[test]
fn committed_batch_ids_rejected_after_restart() {
    for mut ts in TestStore::all() {
        {
            let (mut writer, _) = ts.pipeline(IngestConfig::default());
            writer.process_batch(&docs("a", 5), "batch_001").unwrap();
            writer.process_batch(&docs("b", 5), "batch_002").unwrap();
        }
        ts.restart();

        let mut ingestor = Ingestor::open(ts.store.clone(), IngestConfig::default()).unwrap();
        let err = ingestor
            .writer()
            .process_batch(&docs("c", 5), "batch_001")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg == "Batch ID already exists"));
        assert_eq!(ts.count(), 10);
    }
}

#[test]
fn repeated_restarts_converge() {
    for mut ts in TestStore::all() {
        for round in 0..3 {
            let mut ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
            ingestor.ingest(docs(&format!("r{round}"), 15)).unwrap();
            let next = ingestor.next_batch().to_string();
            drop(ingestor);

            // Leave a torn batch behind every time
            ts.store
                .insert_documents(&docs(&format!("torn{round}"), 2), &next)
                .unwrap();
            ts.restart();
        }

        let ingestor = Ingestor::open(ts.store.clone(), IngestConfig::for_testing()).unwrap();
        assert_eq!(ts.count(), 45);
        assert_eq!(ingestor.recovery().recovered_batches, 6);
        assert_eq!(ingestor.validate_integrity().integrity, IntegrityLevel::Full);
    }
}
