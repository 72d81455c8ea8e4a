//! Segment/tier navigation.
//!
//! A [`TierCursor`] is a plain value naming where in the table an operation
//! is positioned. Navigation functions take a cursor and return a new one;
//! nothing about the position is stored in the table itself.

use crate::primitives::io::Region;
use crate::types::{Result, SegmentIndex, TierHashError, TierIndex};

use super::table::HashTable;
use super::tier::{TierMut, TierRef};

/// Position of one tier within one segment's chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierCursor {
    /// Segment whose chain the cursor walks. For a cursor produced by
    /// [`HashTable::enter_tier`] on an overflow tier this is the stored,
    /// unverified owner.
    pub segment: SegmentIndex,
    /// Physical tier index.
    pub tier: TierIndex,
    /// Position in the chain, 0 for the primary tier.
    pub depth: u32,
    /// Byte offset of the tier in the region.
    pub offset: usize,
}

impl<R: Region> HashTable<R> {
    /// Byte offset of `tier`, checked against the mapped region.
    pub(crate) fn locate(&self, tier: TierIndex) -> Result<usize> {
        let geometry = self.geometry();
        let offset = geometry
            .tier_offset(tier)
            .ok_or(TierHashError::Corruption("tier index out of range"))?;
        match offset.checked_add(geometry.tier_len()) {
            Some(end) if end <= self.region().len() => Ok(offset),
            _ => Err(TierHashError::Corruption("tier outside mapped region")),
        }
    }

    /// Positions on a segment's primary tier.
    pub fn enter_segment(&self, segment: SegmentIndex) -> Result<TierCursor> {
        if segment.0 >= self.geometry().segment_count {
            return Err(TierHashError::Invalid("segment index out of range"));
        }
        let tier = self.geometry().primary_tier(segment);
        Ok(TierCursor {
            segment,
            tier,
            depth: 0,
            offset: self.locate(tier)?,
        })
    }

    /// Positions on an arbitrary tier, trusting its stored owner and depth.
    pub fn enter_tier(&self, tier: TierIndex) -> Result<TierCursor> {
        let offset = self.locate(tier)?;
        if self.geometry().is_primary(tier) {
            return Ok(TierCursor {
                segment: SegmentIndex((tier.0 - 1) as u32),
                tier,
                depth: 0,
                offset,
            });
        }
        let view = TierRef::new(self.tier_bytes(offset), self.geometry());
        Ok(TierCursor {
            segment: view.segment_index(),
            tier,
            depth: view.depth(),
            offset,
        })
    }

    /// Follows the forward link from `cursor`, if any.
    pub fn next_tier(&self, cursor: &TierCursor) -> Result<Option<TierCursor>> {
        let next = self.tier(cursor).next_tier_index();
        if next.is_none() {
            return Ok(None);
        }
        if self.geometry().is_primary(next) {
            return Err(TierHashError::Corruption("chain links into a primary tier"));
        }
        Ok(Some(TierCursor {
            segment: cursor.segment,
            tier: next,
            depth: cursor.depth + 1,
            offset: self.locate(next)?,
        }))
    }

    /// Steps back toward the primary tier; `None` at depth 0.
    pub fn prev_tier(&self, cursor: &TierCursor) -> Result<Option<TierCursor>> {
        if cursor.depth == 0 {
            return Ok(None);
        }
        let prev = self.tier(cursor).prev_tier_index();
        if prev.is_none() {
            return Err(TierHashError::Corruption("overflow tier without predecessor"));
        }
        Ok(Some(TierCursor {
            segment: cursor.segment,
            tier: prev,
            depth: cursor.depth - 1,
            offset: self.locate(prev)?,
        }))
    }

    /// Walks a segment's chain from the primary tier to its end.
    ///
    /// Depths in the returned cursors count steps taken, not stored values.
    pub fn chain(&self, segment: SegmentIndex) -> Result<Vec<TierCursor>> {
        let limit = self.chain_limit();
        let mut cursor = self.enter_segment(segment)?;
        let mut chain = vec![cursor];
        while let Some(next) = self.next_tier(&cursor)? {
            if chain.len() as u64 > limit {
                return Err(TierHashError::Corruption("tier chain cycle"));
            }
            chain.push(next);
            cursor = next;
        }
        Ok(chain)
    }

    /// Positions on the last tier of a segment's chain.
    pub fn last_tier(&self, segment: SegmentIndex) -> Result<TierCursor> {
        let limit = self.chain_limit();
        let mut cursor = self.enter_segment(segment)?;
        while let Some(next) = self.next_tier(&cursor)? {
            if u64::from(next.depth) > limit {
                return Err(TierHashError::Corruption("tier chain cycle"));
            }
            cursor = next;
        }
        Ok(cursor)
    }

    /// Read view of the tier under `cursor`.
    pub fn tier(&self, cursor: &TierCursor) -> TierRef<'_> {
        TierRef::new(self.tier_bytes(cursor.offset), self.geometry())
    }

    /// Write view of the tier under `cursor`.
    pub fn tier_mut(&mut self, cursor: &TierCursor) -> TierMut<'_> {
        let len = self.geometry().tier_len();
        let (geometry, region) = self.parts_mut();
        TierMut::new(
            &mut region.bytes_mut()[cursor.offset..cursor.offset + len],
            geometry,
        )
    }

    fn tier_bytes(&self, offset: usize) -> &[u8] {
        &self.region().bytes()[offset..offset + self.geometry().tier_len()]
    }

    // Longest chain possible: every allocated overflow tier behind one primary.
    fn chain_limit(&self) -> u64 {
        self.geometry().pool_tiers(self.geometry().max_bulks)
    }
}
