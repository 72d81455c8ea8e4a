//! tierhash: a persistent, segmented hash table in a single memory-mapped file.
//!
//! Keys hash to one of a fixed number of segments. Each segment owns a
//! primary tier and, once that fills, a chain of overflow tiers drawn from a
//! shared pool that grows in bulks. After an unclean shutdown,
//! [`HashTable::recover`] rebuilds the chains, the free list, and the global
//! counters from the entries themselves.

#![warn(missing_docs)]

pub mod admin;
pub mod primitives;
pub mod recovery;
pub mod storage;
pub mod types;

pub use recovery::{RecoveryReport, ShadowPolicy, TierRepair};
pub use storage::{HashTable, TableOptions};
pub use types::{Result, TierHashError};
