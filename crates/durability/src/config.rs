//! Ingestion configuration
//!
//! Controls batch sizing, the batch identifier layout, and the optional
//! local checkpoint snapshot.

use std::path::PathBuf;

use docsink_core::BatchId;

/// Maximum zero-padding width for generated batch ids
pub const MAX_BATCH_ID_WIDTH: usize = 20;

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Documents per generated batch
    pub batch_size: usize,
    /// Prefix of generated batch ids (`batch` in `batch_001`)
    pub batch_prefix: String,
    /// Zero-padding width of generated batch ids
    pub batch_id_width: usize,
    /// Where to mirror each checkpoint as a local snapshot (None = disabled)
    pub snapshot_path: Option<PathBuf>,
    /// Cross-check the cumulative total against storage on every checkpoint
    pub verify_db_state: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            batch_size: 100,
            batch_prefix: "batch".to_string(),
            batch_id_width: 3,
            snapshot_path: None,
            verify_db_state: false,
        }
    }
}

impl IngestConfig {
    /// Create config for testing
    ///
    /// Uses small batches and verifies storage counts on every checkpoint.
    pub fn for_testing() -> Self {
        IngestConfig {
            batch_size: 10,
            verify_db_state: true,
            ..Default::default()
        }
    }

    /// Set documents per batch
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the batch id prefix
    pub fn with_batch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.batch_prefix = prefix.into();
        self
    }

    /// Set the batch id padding width
    pub fn with_batch_id_width(mut self, width: usize) -> Self {
        self.batch_id_width = width;
        self
    }

    /// Enable the local checkpoint snapshot
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Set storage verification on checkpoint
    pub fn with_verify_db_state(mut self, verify: bool) -> Self {
        self.verify_db_state = verify;
        self
    }

    /// Batch id with the configured prefix and width
    pub fn batch_id(&self, number: u64) -> BatchId {
        BatchId::new(self.batch_prefix.clone(), number, self.batch_id_width)
    }

    /// First batch id of a fresh run (`batch_001` by default)
    pub fn first_batch_id(&self) -> BatchId {
        self.batch_id(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        let prefix_ok = !self.batch_prefix.is_empty()
            && self.batch_prefix.bytes().all(|b| b.is_ascii_alphanumeric());
        if !prefix_ok {
            return Err(ConfigError::InvalidBatchPrefix(self.batch_prefix.clone()));
        }
        if self.batch_id_width == 0 || self.batch_id_width > MAX_BATCH_ID_WIDTH {
            return Err(ConfigError::InvalidBatchIdWidth(self.batch_id_width));
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Batch size must be positive
    #[error("batch_size must be greater than zero")]
    InvalidBatchSize,

    /// Prefix must be non-empty ASCII alphanumerics (no `_`)
    #[error("invalid batch prefix: {0:?}")]
    InvalidBatchPrefix(String),

    /// Width out of range
    #[error("batch_id_width must be between 1 and {MAX_BATCH_ID_WIDTH}, got {0}")]
    InvalidBatchIdWidth(usize),
}
