//! Checkpoint records and the answers derived from them
//!
//! A checkpoint says "batch X was the last one durably stored, and N
//! documents had been persisted in total at that point". The ledger of
//! checkpoints is append-only: a new record supersedes the previous one and
//! never edits it.
//!
//! # Persisted representation
//!
//! ```json
//! {
//!   "last_batch_id": "batch_004",
//!   "total_persisted": 400,
//!   "status": "committed",
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "db_count_matches": false
//! }
//! ```
//!
//! Records read back from storage are untrusted: [`RecoveryPoint::from_record`]
//! and [`Checkpoint::from_record`] reject anything that is not a mapping,
//! lacks `last_batch_id`/`total_persisted`, or carries a negative total.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::batch_id::{batch_number, next_batch_id};
use crate::error::{Error, Result};

/// Lifecycle status of a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    /// The batch is durably stored
    #[default]
    Committed,
    /// The batch was announced but not confirmed
    Pending,
}

impl CheckpointStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Committed => "committed",
            CheckpointStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "committed" => Ok(CheckpointStatus::Committed),
            "pending" => Ok(CheckpointStatus::Pending),
            other => Err(Error::corrupt(format!("unknown checkpoint status: {other}"))),
        }
    }
}

/// A durable record of the last committed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last batch whose documents are durably stored
    pub last_batch_id: String,
    /// Cumulative number of persisted documents
    pub total_persisted: u64,
    /// Lifecycle status
    pub status: CheckpointStatus,
    /// When the checkpoint was taken
    pub timestamp: DateTime<Utc>,
    /// Whether storage's document count matched `total_persisted` when checked
    #[serde(default)]
    pub db_count_matches: bool,
    /// Caller-supplied metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Checkpoint {
    /// Create a committed checkpoint stamped now
    pub fn committed(last_batch_id: impl Into<String>, total_persisted: u64) -> Self {
        Checkpoint {
            last_batch_id: last_batch_id.into(),
            total_persisted,
            status: CheckpointStatus::Committed,
            timestamp: Utc::now(),
            db_count_matches: false,
            metadata: None,
        }
    }

    /// Persisted representation
    pub fn to_record(&self) -> Value {
        let mut record = json!({
            "last_batch_id": self.last_batch_id,
            "total_persisted": self.total_persisted,
            "status": self.status.as_str(),
            "timestamp": self.timestamp.to_rfc3339(),
            "db_count_matches": self.db_count_matches,
        });
        if let (Some(metadata), Some(map)) = (&self.metadata, record.as_object_mut()) {
            map.insert("metadata".to_string(), metadata.clone());
        }
        record
    }

    /// Rebuild a checkpoint from its persisted representation
    ///
    /// Optional fields fall back to defaults: status to committed, timestamp
    /// to now, `db_count_matches` to false.
    pub fn from_record(record: &Value) -> Result<Self> {
        let point = RecoveryPoint::from_record(record)?;
        let map = as_mapping(record)?;
        let last_batch_id = point
            .last_batch_id
            .ok_or_else(|| Error::corrupt("Checkpoint has no last_batch_id"))?;

        let status = match map.get("status") {
            Some(Value::String(s)) => s.parse()?,
            None | Some(Value::Null) => CheckpointStatus::Committed,
            Some(other) => {
                return Err(Error::corrupt(format!("status is not a string: {other}")));
            }
        };

        Ok(Checkpoint {
            last_batch_id,
            total_persisted: point.total_persisted,
            status,
            timestamp: map
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            db_count_matches: map
                .get("db_count_matches")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            metadata: map.get("metadata").filter(|m| !m.is_null()).cloned(),
        })
    }
}

/// Where processing should resume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPoint {
    /// Last committed batch, if any
    pub last_batch_id: Option<String>,
    /// Cumulative persisted documents at that batch
    pub total_persisted: u64,
    /// True iff `last_batch_id` is present
    pub can_resume: bool,
}

impl RecoveryPoint {
    /// Nothing has been committed yet
    pub fn fresh() -> Self {
        RecoveryPoint {
            last_batch_id: None,
            total_persisted: 0,
            can_resume: false,
        }
    }

    /// Recovery point described by a checkpoint
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        RecoveryPoint {
            last_batch_id: Some(checkpoint.last_batch_id.clone()),
            total_persisted: checkpoint.total_persisted,
            can_resume: true,
        }
    }

    /// Validate an untrusted checkpoint record
    ///
    /// A present-but-null (or empty) `last_batch_id` is accepted and means
    /// nothing can be resumed.
    pub fn from_record(record: &Value) -> Result<Self> {
        let map = as_mapping(record)?;
        let last = map
            .get("last_batch_id")
            .ok_or_else(|| Error::corrupt("Checkpoint missing required field: last_batch_id"))?;
        let total = map
            .get("total_persisted")
            .ok_or_else(|| Error::corrupt("Checkpoint missing required field: total_persisted"))?;

        let last_batch_id = match last {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => {
                return Err(Error::corrupt(format!(
                    "last_batch_id is not a string: {other}"
                )));
            }
        };

        let total_persisted = match (total.as_u64(), total.as_i64()) {
            (Some(n), _) => n,
            (None, Some(_)) => {
                return Err(Error::corrupt("Checkpoint has negative total_persisted"));
            }
            (None, None) => {
                return Err(Error::corrupt(format!(
                    "total_persisted is not an integer: {total}"
                )));
            }
        };

        Ok(RecoveryPoint {
            can_resume: last_batch_id.is_some(),
            last_batch_id,
            total_persisted,
        })
    }

    /// Next batch to process: the last id's number plus one, same padding
    pub fn resume_from(&self) -> Option<String> {
        self.last_batch_id.as_deref().and_then(next_batch_id)
    }

    /// Number of batches committed, derived from the last id's suffix
    pub fn committed_batches(&self) -> u64 {
        self.last_batch_id
            .as_deref()
            .and_then(batch_number)
            .unwrap_or(0)
    }
}

/// Comparison between the checkpoint's believed count and storage's actual count
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsistencyReport {
    /// True if the counts agree
    pub consistent: bool,
    /// Human-readable descriptions of each mismatch
    pub discrepancies: Vec<String>,
}

impl ConsistencyReport {
    /// A report with nothing to say
    pub fn consistent() -> Self {
        ConsistencyReport {
            consistent: true,
            discrepancies: Vec::new(),
        }
    }

    /// Compare the checkpointed total against the stored count
    pub fn compare(checkpoint_total: u64, db_count: u64) -> Self {
        if checkpoint_total == db_count {
            return Self::consistent();
        }
        let message = if checkpoint_total > db_count {
            format!(
                "missing {} documents (checkpoint: {checkpoint_total}, db: {db_count})",
                checkpoint_total - db_count
            )
        } else {
            format!(
                "surplus {} documents (checkpoint: {checkpoint_total}, db: {db_count})",
                db_count - checkpoint_total
            )
        };
        ConsistencyReport {
            consistent: false,
            discrepancies: vec![message],
        }
    }
}

fn as_mapping(record: &Value) -> Result<&Map<String, Value>> {
    record
        .as_object()
        .ok_or_else(|| Error::corrupt("Checkpoint data is not a mapping"))
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` layout
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
