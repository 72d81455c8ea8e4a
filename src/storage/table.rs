use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info, warn};

use crate::primitives::bytes::be;
use crate::primitives::concurrency::LockState;
use crate::primitives::io::Region;
use crate::types::{PoolOrdinal, Result, SegmentIndex, TierHashError, TierIndex};

use super::cursor::TierCursor;
use super::global::GlobalMutableState;
use super::layout::{segment, Geometry, HEADER_LEN};
use super::options::TableOptions;

/// A segmented hash table laid out in one contiguous [`Region`].
///
/// Keys hash to a segment; each segment owns a primary tier and a chain of
/// overflow tiers borrowed from a shared pool. Every mutation takes
/// `&mut self`, so a table value is the exclusive owner of its storage.
pub struct HashTable<R: Region> {
    region: R,
    geometry: Geometry,
}

impl<R: Region> std::fmt::Debug for HashTable<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTable")
            .field("geometry", &self.geometry)
            .field("region_len", &self.region.len())
            .finish()
    }
}

impl<R: Region> HashTable<R> {
    /// Lays out a new, empty table in `region`.
    ///
    /// Writes the header, zeroed segment headers and primary tiers, and
    /// `initial_bulks` overflow bulks threaded onto the free list.
    pub fn create(mut region: R, opts: &TableOptions) -> Result<Self> {
        opts.validate()?;
        let seed = opts.hash_seed.unwrap_or_else(|| OsRng.next_u64());
        let geometry = Geometry::from_options(opts, seed);
        let len = geometry.region_len(opts.initial_bulks);
        if len == usize::MAX {
            return Err(TierHashError::Invalid("table geometry exceeds address space"));
        }
        region.grow(len)?;
        region.bytes_mut()[..len].fill(0);
        geometry.encode(&mut region.bytes_mut()[..HEADER_LEN]);

        let mut table = Self { region, geometry };
        let mut global = GlobalMutableState {
            allocated_bulks: opts.initial_bulks,
            extra_tiers_in_use: 0,
            first_free_tier_index: TierIndex::NONE,
        };
        let pool = geometry.pool_tiers(opts.initial_bulks);
        if pool > 0 {
            let first = table.ordinal_to_tier_index(PoolOrdinal(0));
            let last = table.ordinal_to_tier_index(PoolOrdinal(pool - 1));
            table.link_and_zero_free_tiers(first, last)?;
            global.first_free_tier_index = first;
        }
        table.persist_global(&global);
        table.region.flush()?;
        info!(
            segments = geometry.segment_count,
            entries_per_tier = geometry.entries_per_tier,
            entry_size = geometry.entry_size,
            tiers_per_bulk = geometry.tiers_per_bulk,
            initial_bulks = opts.initial_bulks,
            max_bulks = geometry.max_bulks,
            region_len = len,
            "table.create"
        );
        Ok(table)
    }

    /// Opens a table that was shut down cleanly.
    ///
    /// A segment lock that is still held means the last writer crashed; such
    /// a table must go through [`HashTable::recover`] first.
    pub fn open(region: R) -> Result<Self> {
        let table = Self::attach(region)?;
        for raw in 0..table.geometry.segment_count {
            let word = table.lock_word(SegmentIndex(raw));
            if word != LockState::CLEAR {
                warn!(
                    segment = raw,
                    lock = %LockState::decode(word),
                    "table.open.stale_lock"
                );
                return Err(TierHashError::Corruption(
                    "segment lock held; table needs recovery",
                ));
            }
        }
        debug!(
            segments = table.geometry.segment_count,
            region_len = table.region.len(),
            "table.open"
        );
        Ok(table)
    }

    /// Validates the header and that the region covers every allocated bulk.
    pub(crate) fn attach(region: R) -> Result<Self> {
        let geometry = Geometry::decode(region.bytes())?;
        let global = GlobalMutableState::load(region.bytes());
        if global.allocated_bulks > geometry.max_bulks {
            return Err(TierHashError::Corruption("allocated bulks exceed max_bulks"));
        }
        if region.len() < geometry.region_len(global.allocated_bulks) {
            return Err(TierHashError::Corruption(
                "region shorter than its allocated bulks",
            ));
        }
        Ok(Self { region, geometry })
    }

    /// Immutable geometry read from the header.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Underlying storage.
    pub fn region(&self) -> &R {
        &self.region
    }

    pub(crate) fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }

    pub(crate) fn parts_mut(&mut self) -> (&Geometry, &mut R) {
        (&self.geometry, &mut self.region)
    }

    /// Gives the storage back, e.g. to reopen or inspect it.
    pub fn into_region(self) -> R {
        self.region
    }

    /// Reads the Global Mutable State from the header.
    pub fn load_global(&self) -> GlobalMutableState {
        GlobalMutableState::load(&self.region.bytes()[..HEADER_LEN])
    }

    /// Writes the Global Mutable State back into the header.
    pub fn persist_global(&mut self, global: &GlobalMutableState) {
        global.persist(&mut self.region.bytes_mut()[..HEADER_LEN]);
    }

    /// Raw lock word of a segment. Panics if `segment` is out of range.
    pub fn lock_word(&self, segment: SegmentIndex) -> u64 {
        assert!(segment.0 < self.geometry.segment_count, "segment out of range");
        let off = self.geometry.segment_header_offset(segment) + segment::LOCK;
        be::get_u64(self.region.bytes(), off)
    }

    /// Overwrites a segment's lock word. Panics if `segment` is out of range.
    pub fn set_lock_word(&mut self, segment: SegmentIndex, word: u64) {
        assert!(segment.0 < self.geometry.segment_count, "segment out of range");
        let off = self.geometry.segment_header_offset(segment) + segment::LOCK;
        be::put_u64(self.region.bytes_mut(), off, word);
    }

    /// Looks up `key`. When several tiers of the chain hold it, the deepest
    /// copy wins.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_key(key)?;
        let segment = self.geometry.segment_of(key);
        for cursor in self.chain(segment)?.iter().rev() {
            if let Some((_, found)) = self.tier(cursor).find(key) {
                return Ok(Some(found.value.to_vec()));
            }
        }
        Ok(None)
    }

    /// Inserts or replaces `key`.
    ///
    /// An existing copy is updated in place; a new key takes the first free
    /// slot from the primary tier outward, and a full chain grows by one
    /// overflow tier.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        let len = key.len() + value.len();
        let max = self.geometry.payload_capacity();
        if len > max {
            return Err(TierHashError::EntryTooLarge { len, max });
        }
        let segment = self.geometry.segment_of(key);
        self.write_locked(segment, |table| table.put_in_segment(segment, key, value))
    }

    /// Removes every copy of `key`, returning the value `get` would have seen.
    ///
    /// An overflow tier left without entries is refilled from the chain's
    /// tail or handed back to the pool, so recovery never mistakes an in-use
    /// tier for the start of the free run.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_key(key)?;
        let segment = self.geometry.segment_of(key);
        self.write_locked(segment, |table| {
            let mut removed = None;
            for cursor in table.chain(segment)?.iter().rev() {
                while let Some((slot, found)) = table.tier(cursor).find(key) {
                    if removed.is_none() {
                        removed = Some(found.value.to_vec());
                    }
                    table.tier_mut(cursor).clear_slot(slot);
                }
                table.sync_entry_count(cursor);
            }
            if removed.is_some() {
                let mut global = table.load_global();
                let compaction = table.compact_segment(segment, &mut global)?;
                if compaction.tiers_released > 0 {
                    table.persist_global(&global);
                }
            }
            Ok(removed)
        })
    }

    /// Number of live slots across all segments.
    pub fn len(&self) -> Result<u64> {
        let mut total = 0u64;
        for raw in 0..self.geometry.segment_count {
            for cursor in self.chain(SegmentIndex(raw))? {
                total += self.tier(&cursor).live_count() as u64;
            }
        }
        Ok(total)
    }

    /// Returns true if no segment holds a live slot.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Physical tier indexes of a segment's chain, primary first.
    pub fn segment_chain(&self, segment: SegmentIndex) -> Result<Vec<TierIndex>> {
        Ok(self.chain(segment)?.into_iter().map(|c| c.tier).collect())
    }

    /// Makes every write durable.
    pub fn flush(&mut self) -> Result<()> {
        self.region.flush()
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(TierHashError::Invalid("key must not be empty"));
        }
        Ok(())
    }

    // Holds the segment's write bit for the duration of `op`, leaving it set
    // only if the process dies mid-mutation.
    fn write_locked<T>(
        &mut self,
        segment: SegmentIndex,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.set_lock_word(segment, LockState::write_locked());
        let result = op(self);
        self.set_lock_word(segment, LockState::CLEAR);
        result
    }

    fn put_in_segment(&mut self, segment: SegmentIndex, key: &[u8], value: &[u8]) -> Result<()> {
        let chain = self.chain(segment)?;
        for cursor in chain.iter().rev() {
            if let Some((slot, _)) = self.tier(cursor).find(key) {
                self.tier_mut(cursor).write_entry(slot, key, value);
                return Ok(());
            }
        }
        for cursor in &chain {
            if let Some(slot) = self.tier(cursor).first_free_slot() {
                self.tier_mut(cursor).write_entry(slot, key, value);
                self.sync_entry_count(cursor);
                return Ok(());
            }
        }
        let last = *chain
            .last()
            .ok_or(TierHashError::Corruption("segment chain is empty"))?;
        let mut global = self.load_global();
        let tier = self.allocate_tier(&mut global)?;
        let appended = TierCursor {
            segment,
            tier,
            depth: last.depth + 1,
            offset: self.locate(tier)?,
        };
        {
            let mut view = self.tier_mut(&appended);
            view.set_prev_tier_index(last.tier);
            view.set_segment_index(segment);
            view.set_depth(appended.depth);
            view.write_entry(0, key, value);
            view.set_entries(1);
        }
        self.tier_mut(&last).set_next_tier_index(tier);
        self.persist_global(&global);
        debug!(
            segment = segment.0,
            tier = tier.0,
            depth = appended.depth,
            "table.put.tier_appended"
        );
        Ok(())
    }

    pub(crate) fn sync_entry_count(&mut self, cursor: &TierCursor) {
        let live = self.tier(cursor).live_count() as u32;
        self.tier_mut(cursor).set_entries(live);
    }

    /// Refills or releases overflow tiers of `segment` that hold no live
    /// entry, so every in-use pool tier keeps at least one.
    ///
    /// An empty tail is unlinked and released; an empty tier further in takes
    /// one entry from the tail. The caller persists `global`.
    pub(crate) fn compact_segment(
        &mut self,
        segment: SegmentIndex,
        global: &mut GlobalMutableState,
    ) -> Result<Compaction> {
        let mut done = Compaction::default();
        loop {
            let chain = self.chain(segment)?;
            let Some(hole) = chain
                .iter()
                .skip(1)
                .find(|cursor| self.tier(cursor).live_count() == 0)
                .copied()
            else {
                break;
            };
            let tail = chain[chain.len() - 1];
            if self.tier(&tail).live_count() == 0 {
                let before = chain[chain.len() - 2];
                self.tier_mut(&before).set_next_tier_index(TierIndex::NONE);
                self.release_tier(tail.tier, global)?;
                done.tiers_released += 1;
                continue;
            }
            let slot = self
                .tier(&tail)
                .live_slots()
                .next()
                .ok_or(TierHashError::Corruption("live count without live slot"))?;
            let (key, value) = {
                let entry = self
                    .tier(&tail)
                    .entry(slot)
                    .map_err(|_| TierHashError::Corruption("live entry does not decode"))?;
                (entry.key.to_vec(), entry.value.to_vec())
            };
            // write before clearing: a crash in between leaves a duplicate
            // that recovery resolves
            self.tier_mut(&hole).write_entry(0, &key, &value);
            self.sync_entry_count(&hole);
            self.tier_mut(&tail).clear_slot(slot);
            self.sync_entry_count(&tail);
            done.entries_moved += 1;
        }
        if done != Compaction::default() {
            debug!(
                segment = segment.0,
                entries_moved = done.entries_moved,
                tiers_released = done.tiers_released,
                "table.compact_segment"
            );
        }
        Ok(done)
    }
}

/// What [`HashTable::compact_segment`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Compaction {
    pub(crate) entries_moved: u32,
    pub(crate) tiers_released: u32,
}
