//! Batch identifier wire format
//!
//! Batch ids are ASCII strings of the form `<prefix>_<zero-padded integer>`,
//! for example `batch_007`. The numeric suffix defines the total order of
//! batches, and its width is kept when the next id is derived, so
//! `batch_009` is followed by `batch_010` and `b_7` by `b_8`.
//!
//! A trailing `_partial` (`batch_006_partial`) tags documents belonging to a
//! batch that was never committed.
//!
//! # Conforming ids
//!
//! An id conforms when it splits on `_` into exactly two parts and the second
//! part is a non-empty run of ASCII digits. Anything else (`batch-7`,
//! `run_a_001`, `import`) is non-conforming: it can still be stored, but it
//! has no position in the batch order.

use std::fmt;

/// Suffix marking documents of an uncommitted batch
pub const PARTIAL_SUFFIX: &str = "_partial";

/// A parsed, conforming batch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchId {
    prefix: String,
    number: u64,
    width: usize,
}

impl BatchId {
    /// Create a batch id from its parts
    pub fn new(prefix: impl Into<String>, number: u64, width: usize) -> Self {
        BatchId {
            prefix: prefix.into(),
            number,
            width,
        }
    }

    /// Parse a conforming batch id
    ///
    /// Returns `None` for non-conforming ids, including `_partial` tagged ones.
    pub fn parse(id: &str) -> Option<Self> {
        let (prefix, digits) = id.split_once('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = digits.parse::<u64>().ok()?;
        Some(BatchId {
            prefix: prefix.to_string(),
            number,
            width: digits.len(),
        })
    }

    /// Prefix before the underscore
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Numeric suffix
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Zero-padding width of the numeric suffix
    pub fn width(&self) -> usize {
        self.width
    }

    /// The id that follows this one, with the same prefix and padding
    pub fn next(&self) -> Option<Self> {
        Some(BatchId {
            prefix: self.prefix.clone(),
            number: self.number.checked_add(1)?,
            width: self.width,
        })
    }

    /// This id tagged as an uncommitted batch
    pub fn partial(&self) -> String {
        format!("{self}{PARTIAL_SUFFIX}")
    }

    /// Returns true if `other` shares the prefix and sorts at or before this id
    pub fn covers(&self, other: &BatchId) -> bool {
        self.prefix == other.prefix && other.number <= self.number
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:0width$}", self.prefix, self.number, width = self.width)
    }
}

/// Numeric suffix of a conforming id
pub fn batch_number(id: &str) -> Option<u64> {
    BatchId::parse(id).map(|b| b.number())
}

/// The id following `id`, or `None` if `id` does not conform
pub fn next_batch_id(id: &str) -> Option<String> {
    BatchId::parse(id)?.next().map(|b| b.to_string())
}

/// Split a `_partial` tag off an id
///
/// Returns the base id and whether the tag was present.
pub fn strip_partial(id: &str) -> (&str, bool) {
    match id.strip_suffix(PARTIAL_SUFFIX) {
        Some(base) => (base, true),
        None => (id, false),
    }
}

/// Decide whether documents tagged `doc_batch_id` are evidence of an
/// interrupted write, given the last checkpointed batch
///
/// - With no checkpoint, every tagged batch is partial.
/// - A `_partial` tag is always partial.
/// - Two conforming ids compare by number.
/// - A non-conforming document id is partial unless it is the checkpointed id.
/// - A conforming document id cannot be ordered against a non-conforming
///   checkpoint id and is kept.
pub fn is_partial_batch(doc_batch_id: &str, last_checkpointed: Option<&str>) -> bool {
    let last = match last_checkpointed {
        Some(last) => last,
        None => return true,
    };
    if strip_partial(doc_batch_id).1 {
        return true;
    }
    match (BatchId::parse(doc_batch_id), BatchId::parse(last)) {
        (Some(doc), Some(cp)) => doc.number() > cp.number(),
        (None, _) => doc_batch_id != last,
        (Some(_), None) => false,
    }
}
