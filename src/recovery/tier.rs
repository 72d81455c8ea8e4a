//! Per-tier entry repair.
//!
//! The segment passes only need two answers from a tier: "fix yourself for
//! this known owner" and "fix yourself and tell me who owns you". Both live
//! behind [`TierRepair`] so tests and alternative entry formats can swap the
//! checks out.

use crate::primitives::io::Region;
use crate::storage::{HashTable, TierCursor};
use crate::types::{Result, SegmentIndex};

use super::report::{Correction, CorrectionKind, RecoveryReport};

/// Repairs one tier's entry storage in place.
///
/// An `Err` means the tier cannot be interpreted at all; the recovery pass
/// aborts and the table must not be used.
pub trait TierRepair {
    /// Repairs a primary tier whose owner is known from its position.
    fn repair_known_owner<R: Region>(
        &mut self,
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        report: &mut RecoveryReport,
    ) -> Result<()>;

    /// Repairs an overflow tier and infers its owner from the entries alone.
    ///
    /// Returns `None` when no valid entry remains.
    fn infer_owner<R: Region>(
        &mut self,
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        report: &mut RecoveryReport,
    ) -> Result<Option<SegmentIndex>>;
}

/// Default repair: checksum and length validation, owner check, entry count.
///
/// A live slot is dropped when its entry fails to decode or its key hashes to
/// a segment other than the owner. In discovery mode the first valid entry
/// decides the owner.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryRepair;

impl EntryRepair {
    fn scrub<R: Region>(
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        known: Option<SegmentIndex>,
        report: &mut RecoveryReport,
    ) -> Result<Option<SegmentIndex>> {
        let geometry = *table.geometry();
        let mut owner = known;
        let mut dropped = Vec::new();
        {
            let view = table.tier(cursor);
            for slot in view.live_slots() {
                match view.entry(slot) {
                    Err(defect) => dropped.push((slot, format!("slot {slot}: {defect}"), None)),
                    Ok(entry) => {
                        let home = geometry.segment_of(entry.key);
                        match owner {
                            None => owner = Some(home),
                            Some(expected) if expected != home => dropped.push((
                                slot,
                                format!("slot {slot}: key belongs to segment {home}"),
                                Some((home, expected)),
                            )),
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        for (slot, detail, segments) in dropped {
            table.tier_mut(cursor).clear_slot(slot);
            let mut correction = Correction::new(CorrectionKind::InvalidEntry, detail).tier(cursor.tier);
            if let Some(segment) = owner {
                correction = correction.segment(segment);
            }
            if let Some((home, expected)) = segments {
                correction = correction.values(u64::from(home.0), u64::from(expected.0));
            }
            report.record(correction);
            report.counts.invalid_entries += 1;
        }

        let view = table.tier(cursor);
        let live = view.live_count() as u32;
        let stored = view.entries();
        if stored != live {
            let mut correction = Correction::new(CorrectionKind::EntryCount, "entry counter drift")
                .tier(cursor.tier)
                .values(u64::from(stored), u64::from(live));
            if let Some(segment) = owner {
                correction = correction.segment(segment);
            }
            report.record(correction);
            table.tier_mut(cursor).set_entries(live);
        }
        Ok(if live == 0 { None } else { owner })
    }
}

impl TierRepair for EntryRepair {
    fn repair_known_owner<R: Region>(
        &mut self,
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        report: &mut RecoveryReport,
    ) -> Result<()> {
        Self::scrub(table, cursor, Some(cursor.segment), report).map(|_| ())
    }

    fn infer_owner<R: Region>(
        &mut self,
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        report: &mut RecoveryReport,
    ) -> Result<Option<SegmentIndex>> {
        Self::scrub(table, cursor, None, report)
    }
}
