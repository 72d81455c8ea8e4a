use serde::Serialize;

use crate::primitives::bytes::be;
use crate::types::TierIndex;

use super::layout::header;

/// Pool-wide allocation counters kept in the file header.
///
/// Loaded into an owned value before a mutation and written back once after
/// it; nothing reads the header copy while a value is checked out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GlobalMutableState {
    /// Overflow pool capacity in bulks.
    pub allocated_bulks: u32,
    /// Pool ordinals currently linked into some segment's chain.
    pub extra_tiers_in_use: u64,
    /// Head of the free list, or [`TierIndex::NONE`].
    #[serde(serialize_with = "serialize_tier")]
    pub first_free_tier_index: TierIndex,
}

impl GlobalMutableState {
    /// Reads the counters from a file header.
    pub fn load(buf: &[u8]) -> Self {
        Self {
            allocated_bulks: be::get_u32(buf, header::ALLOCATED_BULKS),
            extra_tiers_in_use: be::get_u64(buf, header::EXTRA_TIERS_IN_USE),
            first_free_tier_index: TierIndex(be::get_u64(buf, header::FIRST_FREE_TIER_INDEX)),
        }
    }

    /// Writes the counters back into a file header.
    pub fn persist(&self, buf: &mut [u8]) {
        be::put_u32(buf, header::ALLOCATED_BULKS, self.allocated_bulks);
        be::put_u64(buf, header::EXTRA_TIERS_IN_USE, self.extra_tiers_in_use);
        be::put_u64(
            buf,
            header::FIRST_FREE_TIER_INDEX,
            self.first_free_tier_index.0,
        );
    }
}

fn serialize_tier<S: serde::Serializer>(tier: &TierIndex, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(tier.0)
}
