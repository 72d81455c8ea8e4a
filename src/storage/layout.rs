//! On-disk layout of a table file.
//!
//! ```text
//! [0..128)                        file header (geometry + global mutable state)
//! [128..128 + 16 * segments)      segment headers (lock word + reserved)
//! [.. + tier_len * segments)      primary tiers, tier index 1..=segments
//! [.. + tier_len * pool tiers)    overflow bulks, tier index segments+1..
//! ```
//!
//! A tier is its counters area, an occupancy bitmap, then the entry slots.
//! All integers are big-endian.

use xxhash_rust::xxh64::xxh64;

use crate::primitives::bytes::{be, bits};
use crate::types::checksum::header_crc32;
use crate::types::{Result, SegmentIndex, TierHashError, TierIndex};

use super::options::TableOptions;

/// `TIERHASH` in ASCII.
pub const MAGIC: u64 = u64::from_be_bytes(*b"TIERHASH");
/// Current file format version.
pub const FORMAT_VERSION: u16 = 1;
/// Length of the file header.
pub const HEADER_LEN: usize = 128;
/// Length of one segment header.
pub const SEGMENT_HEADER_LEN: usize = 16;
/// Length of a tier counters area.
pub const TIER_COUNTERS_LEN: usize = 32;
/// Length of the header in front of every entry slot.
pub const ENTRY_HEADER_LEN: usize = 8;
/// Upper bound on entry slots per tier.
pub const MAX_ENTRIES_PER_TIER: u32 = 4096;

pub mod header {
    //! Byte offsets of file header fields.

    /// Eight-byte file magic.
    pub const MAGIC: usize = 0;
    /// On-disk format version, u16.
    pub const FORMAT_VERSION: usize = 8;
    /// Reserved u16, must be zero.
    pub const RESERVED: usize = 10;
    /// Number of segments, u32.
    pub const SEGMENT_COUNT: usize = 12;
    /// Entry slots per tier, u32.
    pub const ENTRIES_PER_TIER: usize = 16;
    /// Bytes per entry slot, u32.
    pub const ENTRY_SIZE: usize = 20;
    /// Overflow tiers per bulk, u32.
    pub const TIERS_PER_BULK: usize = 24;
    /// Bulk allocation ceiling, u32.
    pub const MAX_BULKS: usize = 28;
    /// Segment hashing seed, u64.
    pub const HASH_SEED: usize = 32;
    /// Geometry covered by the header checksum.
    pub const GEOMETRY_END: usize = 40;
    /// Header checksum, u32.
    pub const CRC32: usize = 40;
    /// Bulks currently allocated, u64.
    pub const ALLOCATED_BULKS: usize = 48;
    /// Pool tiers in use, u64.
    pub const EXTRA_TIERS_IN_USE: usize = 56;
    /// Head of the free list, u64.
    pub const FIRST_FREE_TIER_INDEX: usize = 64;
}

pub mod segment {
    //! Byte offsets within a segment header.

    /// Lock word, u64.
    pub const LOCK: usize = 0;
}

pub mod counters {
    //! Byte offsets within a tier counters area.

    /// Forward chain link, u64.
    pub const NEXT_TIER_INDEX: usize = 0;
    /// Backward chain link, or free-list link of a free tier, u64.
    pub const PREV_TIER_INDEX: usize = 8;
    /// Owning segment of an overflow tier, u32.
    pub const SEGMENT_INDEX: usize = 16;
    /// Chain position, u32.
    pub const DEPTH: usize = 20;
    /// Live slot counter, u32.
    pub const ENTRIES: usize = 24;
}

pub mod entry {
    //! Byte offsets within an entry slot.

    /// Entry checksum, u32.
    pub const CRC32: usize = 0;
    /// Key length, u16.
    pub const KEY_LEN: usize = 4;
    /// Value length, u16.
    pub const VALUE_LEN: usize = 6;
}

/// Immutable table geometry, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Number of segments.
    pub segment_count: u32,
    /// Entry slots per tier.
    pub entries_per_tier: u32,
    /// Bytes per entry slot.
    pub entry_size: u32,
    /// Overflow tiers per bulk.
    pub tiers_per_bulk: u32,
    /// Bulk allocation ceiling.
    pub max_bulks: u32,
    /// Seed for key → segment hashing.
    pub hash_seed: u64,
}

impl Geometry {
    pub(crate) fn from_options(opts: &TableOptions, hash_seed: u64) -> Self {
        Self {
            segment_count: opts.segments,
            entries_per_tier: opts.entries_per_tier,
            entry_size: opts.entry_size,
            tiers_per_bulk: opts.tiers_per_bulk,
            max_bulks: opts.max_bulks,
            hash_seed,
        }
    }

    /// Bytes of occupancy bitmap per tier.
    pub fn bitmap_len(&self) -> usize {
        bits::bitmap_len(self.entries_per_tier as usize)
    }

    /// Bytes per tier.
    pub fn tier_len(&self) -> usize {
        TIER_COUNTERS_LEN
            + self.bitmap_len()
            + self.entries_per_tier as usize * self.entry_size as usize
    }

    /// Key plus value bytes one slot can hold.
    pub fn payload_capacity(&self) -> usize {
        self.entry_size as usize - ENTRY_HEADER_LEN
    }

    /// Offset of a segment's header.
    pub fn segment_header_offset(&self, segment: SegmentIndex) -> usize {
        HEADER_LEN + segment.0 as usize * SEGMENT_HEADER_LEN
    }

    fn first_tier_offset(&self) -> usize {
        HEADER_LEN + self.segment_count as usize * SEGMENT_HEADER_LEN
    }

    /// Offset of a tier, or `None` for the sentinel and for indexes whose
    /// offset does not fit in the address space.
    pub fn tier_offset(&self, tier: TierIndex) -> Option<usize> {
        let slot = usize::try_from(tier.0.checked_sub(1)?).ok()?;
        slot.checked_mul(self.tier_len())?
            .checked_add(self.first_tier_offset())
    }

    /// Physical index of a segment's primary tier.
    pub fn primary_tier(&self, segment: SegmentIndex) -> TierIndex {
        TierIndex(u64::from(segment.0) + 1)
    }

    /// Returns true if `tier` is some segment's primary tier.
    pub fn is_primary(&self, tier: TierIndex) -> bool {
        tier.0 >= 1 && tier.0 <= u64::from(self.segment_count)
    }

    /// Overflow tiers provided by `bulks` bulks.
    pub fn pool_tiers(&self, bulks: u32) -> u64 {
        u64::from(bulks) * u64::from(self.tiers_per_bulk)
    }

    /// Region length needed to hold `bulks` allocated bulks.
    ///
    /// Saturates at `usize::MAX` for geometries no region could hold.
    pub fn region_len(&self, bulks: u32) -> usize {
        self.checked_region_len(bulks).unwrap_or(usize::MAX)
    }

    fn checked_region_len(&self, bulks: u32) -> Option<usize> {
        let tiers = u64::from(self.segment_count).checked_add(self.pool_tiers(bulks))?;
        usize::try_from(tiers)
            .ok()?
            .checked_mul(self.tier_len())?
            .checked_add(self.first_tier_offset())
    }

    /// Segment owning `key`.
    pub fn segment_of(&self, key: &[u8]) -> SegmentIndex {
        SegmentIndex((xxh64(key, self.hash_seed) % u64::from(self.segment_count)) as u32)
    }

    /// Writes magic, version and geometry plus the header checksum.
    pub fn encode(&self, buf: &mut [u8]) {
        be::put_u64(buf, header::MAGIC, MAGIC);
        be::put_u16(buf, header::FORMAT_VERSION, FORMAT_VERSION);
        be::put_u16(buf, header::RESERVED, 0);
        be::put_u32(buf, header::SEGMENT_COUNT, self.segment_count);
        be::put_u32(buf, header::ENTRIES_PER_TIER, self.entries_per_tier);
        be::put_u32(buf, header::ENTRY_SIZE, self.entry_size);
        be::put_u32(buf, header::TIERS_PER_BULK, self.tiers_per_bulk);
        be::put_u32(buf, header::MAX_BULKS, self.max_bulks);
        be::put_u64(buf, header::HASH_SEED, self.hash_seed);
        let crc = header_crc32(&buf[..header::GEOMETRY_END]);
        be::put_u32(buf, header::CRC32, crc);
    }

    /// Reads and validates the geometry from a file header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(TierHashError::Corruption("table header truncated"));
        }
        if be::get_u64(buf, header::MAGIC) != MAGIC {
            return Err(TierHashError::Corruption("bad table magic"));
        }
        if be::get_u16(buf, header::FORMAT_VERSION) != FORMAT_VERSION {
            return Err(TierHashError::Corruption("unsupported format version"));
        }
        if be::get_u16(buf, header::RESERVED) != 0 {
            return Err(TierHashError::Corruption("header reserved field non-zero"));
        }
        let crc = header_crc32(&buf[..header::GEOMETRY_END]);
        if crc != be::get_u32(buf, header::CRC32) {
            return Err(TierHashError::Corruption("header crc mismatch"));
        }
        let geometry = Self {
            segment_count: be::get_u32(buf, header::SEGMENT_COUNT),
            entries_per_tier: be::get_u32(buf, header::ENTRIES_PER_TIER),
            entry_size: be::get_u32(buf, header::ENTRY_SIZE),
            tiers_per_bulk: be::get_u32(buf, header::TIERS_PER_BULK),
            max_bulks: be::get_u32(buf, header::MAX_BULKS),
            hash_seed: be::get_u64(buf, header::HASH_SEED),
        };
        if geometry.segment_count == 0
            || geometry.tiers_per_bulk == 0
            || geometry.entries_per_tier == 0
            || geometry.entries_per_tier > MAX_ENTRIES_PER_TIER
            || (geometry.entry_size as usize) < ENTRY_HEADER_LEN + 2
        {
            return Err(TierHashError::Corruption("header geometry invalid"));
        }
        Ok(geometry)
    }
}
