#![forbid(unsafe_code)]

//! Table administration and maintenance utilities.
//!
//! File-level entry points used by the CLI: creating a table, running crash
//! recovery, collecting statistics, and read-only verification.

mod create;
mod error;
mod options;
mod recover;
mod stats;
mod util;
mod verify;

/// Creates a new table file.
pub use create::{create, CreateReport};

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Configuration options for opening a table in admin mode.
pub use options::AdminOpenOptions;

/// Crash recovery on a table file.
pub use recover::recover;

/// Statistics collection and reporting.
///
/// Geometry, overflow pool usage, and per-segment chain lengths.
pub use stats::{stats, FilesystemStats, GeometrySection, PoolSection, SegmentsSection, StatsReport};

/// Table integrity verification.
///
/// Checks the invariants recovery establishes and reports any violation found.
pub use verify::{
    verify, verify_table, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity,
};

/// Utility functions for opening tables.
pub use util::open_table;
