#![forbid(unsafe_code)]

//! Identifier newtypes, the crate error type, and entry checksums.

use std::fmt;

/// Entry checksum helpers.
pub mod checksum;

pub use checksum::entry_crc32;

/// Index of a segment in `[0, segment_count)`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SegmentIndex(pub u32);

/// Physical index of a tier in the mapped file; `0` means "no tier".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TierIndex(pub u64);

/// Logical position of an overflow tier within the overflow pool.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PoolOrdinal(pub u64);

impl TierIndex {
    /// Sentinel for "no tier", used by chain links and the free-list head.
    pub const NONE: TierIndex = TierIndex(0);

    /// Returns true if this is the "no tier" sentinel.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TierIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PoolOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SegmentIndex {
    fn from(value: u32) -> Self {
        SegmentIndex(value)
    }
}

impl From<SegmentIndex> for u32 {
    fn from(value: SegmentIndex) -> Self {
        value.0
    }
}

/// Errors produced by the table and its recovery pass.
#[derive(thiserror::Error, Debug)]
pub enum TierHashError {
    /// Underlying file or mapping failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Stored bytes cannot be interpreted.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller supplied an unusable argument or configuration.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Every overflow tier the table may allocate is in use.
    #[error("table full: no overflow tier available")]
    Full,
    /// Key and value do not fit in one entry slot.
    #[error("entry too large: {len} bytes, slot holds {max}")]
    EntryTooLarge {
        /// Combined key and value length.
        len: usize,
        /// Payload capacity of one entry slot.
        max: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TierHashError>;
