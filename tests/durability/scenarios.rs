//! Reference scenarios
//!
//! Each scenario runs against every store kind.

use crate::common::*;

// ============================================================================
// Scenario A: crash mid-batch, recover, discard the partial batch
// ============================================================================

#[test]
fn scenario_a_partial_batch_discarded() {
    init_tracing();
    for ts in TestStore::all() {
        let (mut writer, handler) = ts.pipeline(IngestConfig::default());

        for n in 1..=4 {
            let id = batch(n);
            let result = writer.process_batch(&docs(&id, 100), &id).unwrap();
            assert!(result.success, "{:?}: {id} failed", ts.kind);
            assert_eq!(result.persisted_count, 100);
        }
        assert_eq!(writer.checkpoints().latest().unwrap().total_persisted, 400);

        // 30 of 100 documents of batch_005 reach storage, then the process dies
        let torn = docs("batch_005", 100);
        ts.store.insert_documents(&torn[..30], "batch_005").unwrap();

        let result = handler.recover();
        assert!(result.success, "{:?}: {:?}", ts.kind, result.error);
        assert_eq!(result.recovered_batches, 4);
        assert_eq!(result.resume_from.as_deref(), Some("batch_005"));
        assert!(result.partial_batch_discarded);
        assert_eq!(result.data_loss, Some(0));
        assert_eq!(ts.count(), 400);
    }
}

// ============================================================================
// Scenario B: empty batch is a validation error with no side effects
// ============================================================================

#[test]
fn scenario_b_empty_batch_rejected() {
    for ts in TestStore::all() {
        let (mut writer, _) = ts.pipeline(IngestConfig::default());
        writer.process_batch(&docs("a", 3), "batch_001").unwrap();
        let before = ts.store.latest_checkpoint().unwrap();

        let err = writer.process_batch(&[], "batch_002").unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg == "Batch cannot be empty"));

        assert_eq!(ts.count(), 3);
        assert_eq!(ts.store.latest_checkpoint().unwrap(), before);
        assert!(!writer.is_processed("batch_002"));
    }
}

// ============================================================================
// Scenario C: duplicate document id fails the batch, checkpoint untouched
// ============================================================================

#[test]
fn scenario_c_duplicate_insert_fails_cleanly() {
    for ts in TestStore::all() {
        let (mut writer, _) = ts.pipeline(IngestConfig::default());
        writer.process_batch(&docs("a", 10), "batch_001").unwrap();

        let mut batch_two = docs("b", 9);
        batch_two.push(Document::new("a_3", "already stored"));
        let result = writer.process_batch(&batch_two, "batch_002").unwrap();

        assert!(!result.success);
        assert_eq!(result.persisted_count, 0);
        assert!(!result.checkpoint_updated);
        assert!(result.error.is_some());

        let point = writer.checkpoints().get_recovery_point().unwrap();
        assert_eq!(point.last_batch_id.as_deref(), Some("batch_001"));
        assert_eq!(point.total_persisted, 10);
        assert_eq!(ts.count(), 10, "{:?}: batch must be all or nothing", ts.kind);
    }
}

// ============================================================================
// Scenario D: nothing stored, fresh start
// ============================================================================

#[test]
fn scenario_d_fresh_start() {
    for ts in TestStore::all() {
        let (_, handler) = ts.pipeline(IngestConfig::default());
        let result = handler.recover();

        assert!(result.success);
        assert_eq!(result.outcome, RecoveryOutcome::FreshStart);
        assert_eq!(result.recovered_batches, 0);
        assert!(result.resume_from.is_none());
        assert!(!result.can_resume);
        assert!(!result.partial_batch_discarded);
    }
}

// ============================================================================
// Scenario E: checkpoint says 100, storage holds 95
// ============================================================================

#[test]
fn scenario_e_missing_documents_reported() {
    for ts in TestStore::all() {
        ts.store.insert_documents(&docs("a", 95), "batch_001").unwrap();
        ts.store
            .save_checkpoint(&json!({
                "last_batch_id": "batch_001",
                "total_persisted": 100,
                "status": "committed"
            }))
            .unwrap();

        let checkpoints = ts.checkpoints();
        let report = checkpoints.verify_consistency().unwrap();
        assert!(!report.consistent);
        assert_eq!(report.discrepancies.len(), 1);
        let message = &report.discrepancies[0];
        assert!(message.starts_with("missing 5 documents"), "{message}");
        assert!(message.contains("100") && message.contains("95"));

        let integrity = CrashRecoveryHandler::new(checkpoints).validate_integrity();
        assert!(integrity.success);
        assert_eq!(integrity.integrity, IntegrityLevel::Partial);
    }
}

#[test]
fn scenario_e_surplus_documents_reported() {
    for ts in TestStore::all() {
        ts.store.insert_documents(&docs("a", 12), "batch_001").unwrap();
        ts.store
            .save_checkpoint(&json!({"last_batch_id": "batch_001", "total_persisted": 10}))
            .unwrap();

        let report = ts.checkpoints().verify_consistency().unwrap();
        assert_eq!(
            report.discrepancies,
            vec!["surplus 2 documents (checkpoint: 10, db: 12)".to_string()]
        );
    }
}

// ============================================================================
// Corrupt ledger
// ============================================================================

#[test]
fn corrupt_checkpoint_fails_recovery() {
    for ts in TestStore::all() {
        ts.store
            .save_checkpoint(&json!({"last_batch_id": null, "total_persisted": -1, "status": null}))
            .unwrap();

        let (_, handler) = ts.pipeline(IngestConfig::default());
        let result = handler.recover();
        assert!(!result.success);
        assert_eq!(result.outcome, RecoveryOutcome::CorruptCheckpoint);
        assert!(result.error.unwrap().starts_with("corrupt checkpoint:"));
        assert!(result.data_loss.is_none());

        let integrity = handler.validate_integrity();
        assert!(!integrity.success);
        assert_eq!(integrity.integrity, IntegrityLevel::Corrupt);
    }
}

#[test]
fn checkpoint_missing_batch_id_is_corrupt_on_every_store() {
    for ts in TestStore::all() {
        ts.store.insert_documents(&docs("a", 20), "batch_001").unwrap();
        ts.store
            .save_checkpoint(&json!({"total_persisted": 20, "status": "committed"}))
            .unwrap();

        let (_, handler) = ts.pipeline(IngestConfig::default());
        let result = handler.recover();
        assert!(!result.success, "{:?}", ts.kind);
        assert_eq!(result.outcome, RecoveryOutcome::CorruptCheckpoint, "{:?}", ts.kind);
        assert!(result.error.unwrap().contains("last_batch_id"));
        assert_eq!(ts.count(), 20, "{:?}: documents must survive", ts.kind);
    }
}
