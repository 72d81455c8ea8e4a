use std::collections::HashSet;

use crate::primitives::io::Region;
use crate::storage::{HashTable, TierCursor};
use crate::types::{Result, SegmentIndex};

use super::report::{Correction, CorrectionKind, RecoveryReport};

/// Decides which copy of a key survives when a chain holds several.
///
/// The duplicate pass walks each segment from its last tier back to the
/// primary tier and calls [`remove_shadowed`](ShadowPolicy::remove_shadowed)
/// at every stop, so an implementation sees tiers in tail-to-head order.
pub trait ShadowPolicy {
    /// Resets per-segment state before a segment's walk starts.
    fn begin_segment(&mut self, segment: SegmentIndex);

    /// Removes entries of the tier under `cursor` that are superseded by a
    /// tier visited earlier in this segment's walk.
    fn remove_shadowed<R: Region>(
        &mut self,
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        report: &mut RecoveryReport,
    ) -> Result<()>;
}

/// Tail-most copy wins; inside a tier the lowest slot wins.
#[derive(Debug, Default)]
pub struct KeyShadowing {
    seen: HashSet<Vec<u8>>,
}

impl ShadowPolicy for KeyShadowing {
    fn begin_segment(&mut self, _segment: SegmentIndex) {
        self.seen.clear();
    }

    fn remove_shadowed<R: Region>(
        &mut self,
        table: &mut HashTable<R>,
        cursor: &TierCursor,
        report: &mut RecoveryReport,
    ) -> Result<()> {
        let mut shadowed = Vec::new();
        {
            let view = table.tier(cursor);
            for slot in view.live_slots() {
                // undecodable slots were dropped by tier repair
                let Ok(entry) = view.entry(slot) else {
                    continue;
                };
                if !self.seen.insert(entry.key.to_vec()) {
                    shadowed.push((slot, String::from_utf8_lossy(entry.key).into_owned()));
                }
            }
        }
        if shadowed.is_empty() {
            return Ok(());
        }
        for (slot, key) in shadowed {
            table.tier_mut(cursor).clear_slot(slot);
            report.record(
                Correction::new(
                    CorrectionKind::DuplicateEntry,
                    format!("slot {slot}: key {key:?} shadowed by a deeper copy"),
                )
                .segment(cursor.segment)
                .tier(cursor.tier),
            );
            report.counts.duplicates_removed += 1;
        }
        table.sync_entry_count(cursor);
        Ok(())
    }
}
