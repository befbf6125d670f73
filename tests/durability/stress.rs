//! Stress Tests
//!
//! Larger document counts streamed through `ingest`.

use crate::common::*;

fn stream(n: usize) -> impl Iterator<Item = Document> {
    (0..n).map(|i| Document::new(format!("doc_{i:06}"), format!("content {i}")))
}

#[test]
fn large_stream_ingest() {
    for ts in TestStore::all() {
        let config = IngestConfig::default().with_batch_size(250).with_batch_id_width(4);
        let mut ingestor = Ingestor::open(ts.store.clone(), config).unwrap();

        let summary = ingestor.ingest(stream(10_000)).unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.batches, 40);
        assert_eq!(summary.persisted, 10_000);
        assert_eq!(summary.next_batch.to_string(), "batch_0041");
        assert_eq!(ts.count(), 10_000);

        let totals: Vec<u64> = ingestor
            .checkpoints()
            .session_checkpoints()
            .iter()
            .map(|cp| cp.total_persisted)
            .collect();
        assert_eq!(totals.len(), 40);
        assert!(totals.windows(2).all(|w| w[1] == w[0] + 250));
        assert_eq!(ingestor.validate_integrity().integrity, IntegrityLevel::Full);
    }
}

#[test]
fn batch_ids_roll_over_padding() {
    let ts = TestStore::memory();
    let config = IngestConfig::default().with_batch_size(1).with_batch_id_width(1);
    let mut ingestor = Ingestor::open(ts.store.clone(), config).unwrap();

    let summary = ingestor.ingest(stream(12)).unwrap();
    assert_eq!(summary.batches, 12);
    assert_eq!(summary.next_batch.to_string(), "batch_13");

    // Recovery orders by number, not by string
    let result = CrashRecoveryHandler::new(ingestor.checkpoints().clone()).recover();
    assert_eq!(result.recovered_batches, 12);
    assert_eq!(result.resume_from.as_deref(), Some("batch_13"));
    assert!(!result.partial_batch_discarded);
}
