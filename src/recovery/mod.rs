#![forbid(unsafe_code)]

//! Crash recovery.
//!
//! After an unclean shutdown the bookkeeping around the entries (lock words,
//! tier links, the free list, the global counters) may disagree with the
//! entries themselves. Recovery re-derives that bookkeeping from entry
//! contents and overwrites whatever disagrees, recording each fix in a
//! [`RecoveryReport`] and logging it at error level.

mod dedup;
mod report;
mod segments;
mod tier;

use tracing::info;

use crate::primitives::io::Region;
use crate::storage::HashTable;
use crate::types::Result;

pub use dedup::{KeyShadowing, ShadowPolicy};
pub use report::{Correction, CorrectionKind, RecoveryCounts, RecoveryReport};
pub use segments::recover_segments;
pub use tier::{EntryRepair, TierRepair};

impl<R: Region> HashTable<R> {
    /// Validates the header, repairs the table with the default
    /// collaborators, and flushes the result.
    ///
    /// A header that fails validation, or a region shorter than the bulks the
    /// header claims, is fatal: nothing is modified.
    pub fn recover(region: R) -> Result<(Self, RecoveryReport)> {
        let mut table = Self::attach(region)?;
        let report = recover_segments(&mut table, &mut EntryRepair, &mut KeyShadowing::default())?;
        table.flush()?;
        info!(
            clean = report.is_clean(),
            corrections = report.corrections.len(),
            "recovery.flushed"
        );
        Ok((table, report))
    }
}
