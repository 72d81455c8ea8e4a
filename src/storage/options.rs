use serde::{Deserialize, Serialize};

use crate::types::{Result, TierHashError};

use super::layout::{ENTRY_HEADER_LEN, MAX_ENTRIES_PER_TIER};

/// Default number of segments.
pub const DEFAULT_SEGMENTS: u32 = 16;
/// Default number of entry slots per tier.
pub const DEFAULT_ENTRIES_PER_TIER: u32 = 64;
/// Default entry slot size in bytes, header included.
pub const DEFAULT_ENTRY_SIZE: u32 = 64;
/// Default number of tiers allocated together as one bulk.
pub const DEFAULT_TIERS_PER_BULK: u32 = 16;

/// Geometry and capacity settings supplied when creating a table.
///
/// Only consulted by `create`; an existing table reads its geometry from the
/// file header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Number of segments (shards).
    pub segments: u32,
    /// Entry slots per tier.
    pub entries_per_tier: u32,
    /// Bytes per entry slot, including the 8-byte entry header.
    pub entry_size: u32,
    /// Overflow tiers per bulk.
    pub tiers_per_bulk: u32,
    /// Bulks laid out at creation time.
    pub initial_bulks: u32,
    /// Upper bound on bulks the table may ever allocate.
    pub max_bulks: u32,
    /// Seed for key hashing; random when unset.
    pub hash_seed: Option<u64>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            segments: DEFAULT_SEGMENTS,
            entries_per_tier: DEFAULT_ENTRIES_PER_TIER,
            entry_size: DEFAULT_ENTRY_SIZE,
            tiers_per_bulk: DEFAULT_TIERS_PER_BULK,
            initial_bulks: 1,
            max_bulks: 1024,
            hash_seed: None,
        }
    }
}

impl TableOptions {
    /// Sets the number of segments.
    pub fn segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }

    /// Sets the number of entry slots per tier.
    pub fn entries_per_tier(mut self, entries: u32) -> Self {
        self.entries_per_tier = entries;
        self
    }

    /// Sets the entry slot size.
    pub fn entry_size(mut self, bytes: u32) -> Self {
        self.entry_size = bytes;
        self
    }

    /// Sets tiers per bulk.
    pub fn tiers_per_bulk(mut self, tiers: u32) -> Self {
        self.tiers_per_bulk = tiers;
        self
    }

    /// Sets the bulks allocated at creation.
    pub fn initial_bulks(mut self, bulks: u32) -> Self {
        self.initial_bulks = bulks;
        self
    }

    /// Sets the bulk allocation ceiling.
    pub fn max_bulks(mut self, bulks: u32) -> Self {
        self.max_bulks = bulks;
        self
    }

    /// Fixes the key hashing seed, making segment placement reproducible.
    pub fn hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = Some(seed);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.segments == 0 {
            return Err(TierHashError::Invalid("segments must be positive"));
        }
        if self.entries_per_tier == 0 || self.entries_per_tier > MAX_ENTRIES_PER_TIER {
            return Err(TierHashError::Invalid("entries_per_tier out of range"));
        }
        if (self.entry_size as usize) < ENTRY_HEADER_LEN + 2 {
            return Err(TierHashError::Invalid("entry_size too small"));
        }
        if self.entry_size as usize > ENTRY_HEADER_LEN + u16::MAX as usize {
            return Err(TierHashError::Invalid("entry_size too large"));
        }
        if self.tiers_per_bulk == 0 {
            return Err(TierHashError::Invalid("tiers_per_bulk must be positive"));
        }
        if self.initial_bulks > self.max_bulks {
            return Err(TierHashError::Invalid("initial_bulks exceeds max_bulks"));
        }
        Ok(())
    }
}
