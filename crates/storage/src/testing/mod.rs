//! Testing utilities for storage
//!
//! - **Fault injection**: [`FaultyStore`] wraps any [`DocumentStore`] and
//!   fails chosen operations on demand, including a torn insert that leaves
//!   some of a batch behind the way a crashed non-transactional engine would.
//!
//! # Example
//!
//! ```ignore
//! use docsink_storage::testing::{FailPoint, FaultyStore};
//!
//! let store = FaultyStore::new(MemoryStore::new());
//! store.fail(FailPoint::Connection);
//! assert!(store.check_connection().is_err());
//! ```
//!
//! [`DocumentStore`]: docsink_core::DocumentStore

mod fault_injection;

pub use fault_injection::{FailPoint, FaultyStore};
