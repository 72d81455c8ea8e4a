//! Overflow pool management: ordinal mapping, bulk growth, free-list upkeep.
//!
//! Free tiers always form a trailing run of pool ordinals. The free list is
//! threaded through each free tier's `prev_tier_index` in ordinal order and
//! terminated by [`TierIndex::NONE`]. Every chain lists its overflow tiers in
//! ascending ordinal order, which is the order recovery relinks them in.

use tracing::{debug, info};

use crate::primitives::io::Region;
use crate::types::{PoolOrdinal, Result, TierHashError, TierIndex};

use super::global::GlobalMutableState;
use super::table::HashTable;

impl<R: Region> HashTable<R> {
    /// Physical tier index of a pool ordinal.
    pub fn ordinal_to_tier_index(&self, ordinal: PoolOrdinal) -> TierIndex {
        TierIndex(u64::from(self.geometry().segment_count) + 1 + ordinal.0)
    }

    /// Pool ordinal of an overflow tier; `None` for primary tiers and the sentinel.
    pub fn tier_index_to_ordinal(&self, tier: TierIndex) -> Option<PoolOrdinal> {
        let first = u64::from(self.geometry().segment_count) + 1;
        tier.0.checked_sub(first).map(PoolOrdinal)
    }

    /// Threads the free list through tiers `first..=last` and zeroes their
    /// counters and occupancy bitmaps. The last tier terminates the list.
    pub fn link_and_zero_free_tiers(&mut self, first: TierIndex, last: TierIndex) -> Result<()> {
        if first.is_none() || last < first {
            return Err(TierHashError::Invalid("empty free tier range"));
        }
        for raw in first.0..=last.0 {
            let tier = TierIndex(raw);
            let cursor = self.enter_tier(tier)?;
            let link = if tier == last {
                TierIndex::NONE
            } else {
                TierIndex(raw + 1)
            };
            let mut view = self.tier_mut(&cursor);
            view.zero_bookkeeping();
            view.set_prev_tier_index(link);
        }
        debug!(first = first.0, last = last.0, "alloc.link_and_zero_free_tiers");
        Ok(())
    }

    /// Grows the region by one bulk and makes its tiers the free list.
    ///
    /// Only called with an empty free list, so the new bulk becomes the head.
    fn allocate_bulk(&mut self, global: &mut GlobalMutableState) -> Result<()> {
        let geometry = *self.geometry();
        if global.allocated_bulks >= geometry.max_bulks {
            return Err(TierHashError::Full);
        }
        let first_ordinal = geometry.pool_tiers(global.allocated_bulks);
        let bulks = global.allocated_bulks + 1;
        self.region_mut().grow(geometry.region_len(bulks))?;
        global.allocated_bulks = bulks;
        let first = self.ordinal_to_tier_index(PoolOrdinal(first_ordinal));
        let last = self.ordinal_to_tier_index(PoolOrdinal(geometry.pool_tiers(bulks) - 1));
        self.link_and_zero_free_tiers(first, last)?;
        global.first_free_tier_index = first;
        info!(bulks, first = first.0, last = last.0, "alloc.bulk_allocated");
        Ok(())
    }

    /// Pops the free-list head, growing the pool when the list is empty.
    ///
    /// The returned tier has zeroed bookkeeping; the caller links it.
    pub(crate) fn allocate_tier(&mut self, global: &mut GlobalMutableState) -> Result<TierIndex> {
        if global.first_free_tier_index.is_none() {
            self.allocate_bulk(global)?;
        }
        let tier = global.first_free_tier_index;
        let ordinal = self
            .tier_index_to_ordinal(tier)
            .ok_or(TierHashError::Corruption("free list head is a primary tier"))?;
        if ordinal.0 >= self.geometry().pool_tiers(global.allocated_bulks) {
            return Err(TierHashError::Corruption("free list head beyond pool"));
        }
        let cursor = self.enter_tier(tier)?;
        let next_free = self.tier(&cursor).prev_tier_index();
        self.tier_mut(&cursor).zero_bookkeeping();
        global.first_free_tier_index = next_free;
        global.extra_tiers_in_use += 1;
        debug!(
            tier = tier.0,
            ordinal = ordinal.0,
            in_use = global.extra_tiers_in_use,
            "alloc.tier_allocated"
        );
        Ok(tier)
    }

    /// Returns an unlinked overflow tier to the pool.
    ///
    /// The caller has already cut `tier` out of its chain. In-use tiers above
    /// it move down one slot so the in-use ordinals stay a prefix and chains
    /// keep their ordinal order; the last slot goes onto the free list.
    pub(crate) fn release_tier(
        &mut self,
        tier: TierIndex,
        global: &mut GlobalMutableState,
    ) -> Result<()> {
        let ordinal = self
            .tier_index_to_ordinal(tier)
            .ok_or(TierHashError::Corruption("released tier is a primary tier"))?;
        let last_ordinal = global
            .extra_tiers_in_use
            .checked_sub(1)
            .ok_or(TierHashError::Corruption("release with no pool tier in use"))?;
        if ordinal.0 > last_ordinal {
            return Err(TierHashError::Corruption("released tier beyond in-use prefix"));
        }
        let last = self.ordinal_to_tier_index(PoolOrdinal(last_ordinal));
        if last != tier {
            self.shift_tiers_down(tier, last)?;
        }
        let freed = self.enter_tier(last)?;
        {
            let mut view = self.tier_mut(&freed);
            view.zero_bookkeeping();
            view.set_prev_tier_index(global.first_free_tier_index);
        }
        global.first_free_tier_index = last;
        global.extra_tiers_in_use = last_ordinal;
        debug!(
            released = tier.0,
            freed = last.0,
            in_use = global.extra_tiers_in_use,
            "alloc.tier_released"
        );
        Ok(())
    }

    // Closes the gap at `vacant` by moving tiers `vacant+1..=last` down one
    // slot, then renumbers every link into the moved range.
    fn shift_tiers_down(&mut self, vacant: TierIndex, last: TierIndex) -> Result<()> {
        let dst = self.locate(vacant)?;
        let src = self.locate(TierIndex(vacant.0 + 1))?;
        let end = self.locate(last)? + self.geometry().tier_len();
        self.region_mut().bytes_mut().copy_within(src..end, dst);

        let renumber = |link: TierIndex| {
            if link.0 > vacant.0 && link.0 <= last.0 {
                TierIndex(link.0 - 1)
            } else {
                link
            }
        };
        // primaries plus every tier still in use
        for raw in 1..last.0 {
            let cursor = self.enter_tier(TierIndex(raw))?;
            let (next, prev) = {
                let view = self.tier(&cursor);
                (view.next_tier_index(), view.prev_tier_index())
            };
            let mut view = self.tier_mut(&cursor);
            view.set_next_tier_index(renumber(next));
            view.set_prev_tier_index(renumber(prev));
        }
        debug!(
            vacant = vacant.0,
            moved = last.0 - vacant.0,
            "alloc.tiers_shifted"
        );
        Ok(())
    }
}
