//! The three recovery passes.
//!
//! Pass 1 normalizes each segment on its own: lock word, primary-tier
//! bookkeeping, entry repair. Pass 2 rebuilds every overflow chain from the
//! pool, trusting entry contents over stored links, and recomputes the
//! Global Mutable State. Pass 3 removes keys shadowed by a deeper tier and
//! then refills or releases overflow tiers the removal emptied.
//!
//! Passes run strictly in order over all segments; pass 2 appends onto the
//! primaries pass 1 has cleared, and pass 3 needs the rebuilt chains.

use tracing::{debug, info};

use crate::primitives::concurrency::LockState;
use crate::primitives::io::Region;
use crate::storage::{GlobalMutableState, HashTable, TierCursor};
use crate::types::{PoolOrdinal, Result, SegmentIndex, TierHashError, TierIndex};

use super::dedup::ShadowPolicy;
use super::report::{Correction, CorrectionKind, RecoveryReport};
use super::tier::TierRepair;

/// Clears a stale segment lock.
pub(crate) fn reset_segment_lock<R: Region>(
    table: &mut HashTable<R>,
    segment: SegmentIndex,
    report: &mut RecoveryReport,
) {
    let word = table.lock_word(segment);
    if word == LockState::CLEAR {
        return;
    }
    report.record(
        Correction::new(
            CorrectionKind::StaleLock,
            format!("stale lock ({})", LockState::decode(word)),
        )
        .segment(segment)
        .values(word, LockState::CLEAR),
    );
    table.set_lock_word(segment, LockState::CLEAR);
}

/// Forces a primary tier's implicit fields to zero and detaches its chain.
///
/// The forward link is dropped silently: pass 2 re-links every overflow tier.
pub(crate) fn canonicalize_primary<R: Region>(
    table: &mut HashTable<R>,
    cursor: &TierCursor,
    report: &mut RecoveryReport,
) {
    let view = table.tier(cursor);
    let fields = [
        ("prev_tier_index", view.prev_tier_index().0),
        ("segment_index", u64::from(view.segment_index().0)),
        ("depth", u64::from(view.depth())),
    ];
    for (name, stored) in fields {
        if stored != 0 {
            report.record(
                Correction::new(
                    CorrectionKind::PrimaryTierField,
                    format!("primary tier {name} is {stored}"),
                )
                .segment(cursor.segment)
                .tier(cursor.tier)
                .values(stored, 0),
            );
        }
    }
    let mut tier = table.tier_mut(cursor);
    tier.set_prev_tier_index(TierIndex::NONE);
    tier.set_segment_index(SegmentIndex(0));
    tier.set_depth(0);
    tier.set_next_tier_index(TierIndex::NONE);
}

/// Pass 1 over every segment.
pub(crate) fn normalize_segments<R: Region, T: TierRepair>(
    table: &mut HashTable<R>,
    repair: &mut T,
    report: &mut RecoveryReport,
) -> Result<()> {
    for raw in 0..table.geometry().segment_count {
        let segment = SegmentIndex(raw);
        reset_segment_lock(table, segment, report);
        let primary = table.enter_segment(segment)?;
        canonicalize_primary(table, &primary, report);
        repair.repair_known_owner(table, &primary, report)?;
    }
    debug!(
        segments = table.geometry().segment_count,
        corrections = report.corrections.len(),
        "recovery.pass1.done"
    );
    Ok(())
}

/// Pass 2: re-links the in-use pool prefix and rebuilds the free list.
///
/// The first ordinal without a valid entry ends the prefix, even if later
/// ordinals would parse as owned.
pub(crate) fn reconcile_extra_tiers<R: Region, T: TierRepair>(
    table: &mut HashTable<R>,
    global: &mut GlobalMutableState,
    repair: &mut T,
    report: &mut RecoveryReport,
) -> Result<()> {
    let stored_in_use = global.extra_tiers_in_use;
    let pool = table.geometry().pool_tiers(global.allocated_bulks);
    let expected_in_use = stored_in_use.min(pool);
    let mut actual_in_use = 0u64;
    let mut stopped_at = None;

    for ordinal in 0..expected_in_use {
        report.counts.extra_tiers_scanned += 1;
        let tier = table.ordinal_to_tier_index(PoolOrdinal(ordinal));
        let cursor = table.enter_tier(tier)?;
        let Some(owner) = repair.infer_owner(table, &cursor, report)? else {
            stopped_at = Some(ordinal);
            break;
        };
        if owner.0 >= table.geometry().segment_count {
            return Err(TierHashError::Corruption("inferred owner outside segment range"));
        }
        if cursor.segment != owner {
            report.record(
                Correction::new(
                    CorrectionKind::OwnerMismatch,
                    format!("tier stored owner {} but holds keys of {owner}", cursor.segment),
                )
                .segment(owner)
                .tier(tier)
                .values(u64::from(cursor.segment.0), u64::from(owner.0)),
            );
            table.tier_mut(&cursor).set_segment_index(owner);
        }
        table.tier_mut(&cursor).set_next_tier_index(TierIndex::NONE);
        let last = table.last_tier(owner)?;
        {
            let mut view = table.tier_mut(&cursor);
            view.set_prev_tier_index(last.tier);
            view.set_depth(last.depth + 1);
        }
        table.tier_mut(&last).set_next_tier_index(tier);
        report.counts.tiers_linked += 1;
        actual_in_use = ordinal + 1;
    }

    if stored_in_use != actual_in_use {
        report.record(
            Correction::new(CorrectionKind::CounterDrift, "extra_tiers_in_use drift")
                .values(stored_in_use, actual_in_use),
        );
        global.extra_tiers_in_use = actual_in_use;
    }

    let first_free = match stopped_at {
        Some(ordinal) => table.ordinal_to_tier_index(PoolOrdinal(ordinal)),
        None if pool > expected_in_use => {
            table.ordinal_to_tier_index(PoolOrdinal(expected_in_use))
        }
        None => TierIndex::NONE,
    };
    if !first_free.is_none() {
        let last = table.ordinal_to_tier_index(PoolOrdinal(pool - 1));
        table.link_and_zero_free_tiers(first_free, last)?;
        report.counts.free_tiers = last.0 - first_free.0 + 1;
    }
    if global.first_free_tier_index != first_free {
        report.record(
            Correction::new(CorrectionKind::FreeListHead, "first_free_tier_index drift")
                .values(global.first_free_tier_index.0, first_free.0),
        );
        global.first_free_tier_index = first_free;
    }
    debug!(
        stored_in_use,
        actual_in_use,
        first_free = first_free.0,
        "recovery.pass2.done"
    );
    Ok(())
}

/// Pass 3: tail-to-head duplicate elimination per segment.
pub(crate) fn remove_duplicates_in_segments<R: Region, S: ShadowPolicy>(
    table: &mut HashTable<R>,
    global: &mut GlobalMutableState,
    shadow: &mut S,
    report: &mut RecoveryReport,
) -> Result<()> {
    for raw in 0..table.geometry().segment_count {
        let segment = SegmentIndex(raw);
        shadow.begin_segment(segment);
        let mut cursor = table.last_tier(segment)?;
        loop {
            shadow.remove_shadowed(table, &cursor, report)?;
            match table.prev_tier(&cursor)? {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
    }
    if report.counts.duplicates_removed > 0 {
        compact_emptied_tiers(table, global, report)?;
    }
    debug!(
        duplicates_removed = report.counts.duplicates_removed,
        "recovery.pass3.done"
    );
    Ok(())
}

// Every linked tier held a valid entry after pass 2, so only duplicate
// removal can leave one empty.
fn compact_emptied_tiers<R: Region>(
    table: &mut HashTable<R>,
    global: &mut GlobalMutableState,
    report: &mut RecoveryReport,
) -> Result<()> {
    for raw in 0..table.geometry().segment_count {
        let segment = SegmentIndex(raw);
        let in_use = global.extra_tiers_in_use;
        let done = table.compact_segment(segment, global)?;
        if done.entries_moved == 0 && done.tiers_released == 0 {
            continue;
        }
        report.record(
            Correction::new(
                CorrectionKind::EmptyTier,
                format!(
                    "{} entries moved, {} tiers released",
                    done.entries_moved, done.tiers_released
                ),
            )
            .segment(segment)
            .values(in_use, global.extra_tiers_in_use),
        );
        report.counts.free_tiers += u64::from(done.tiers_released);
    }
    Ok(())
}

/// Runs all three passes over `table`.
///
/// Global Mutable State is read once before pass 1 and written once after
/// pass 3. An `Err` from a collaborator aborts the run; the table is then
/// partially repaired and must not be used.
pub fn recover_segments<R: Region, T: TierRepair, S: ShadowPolicy>(
    table: &mut HashTable<R>,
    repair: &mut T,
    shadow: &mut S,
) -> Result<RecoveryReport> {
    let mut global = table.load_global();
    let mut report = RecoveryReport::new(global);
    report.counts.segments = table.geometry().segment_count;

    normalize_segments(table, repair, &mut report)?;
    reconcile_extra_tiers(table, &mut global, repair, &mut report)?;
    remove_duplicates_in_segments(table, &mut global, shadow, &mut report)?;

    table.persist_global(&global);
    report.global = global;
    info!(
        segments = report.counts.segments,
        corrections = report.corrections.len(),
        tiers_linked = report.counts.tiers_linked,
        free_tiers = report.counts.free_tiers,
        duplicates_removed = report.counts.duplicates_removed,
        "recovery.done"
    );
    Ok(report)
}
