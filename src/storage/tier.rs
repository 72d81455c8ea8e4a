//! Typed access to one tier's bytes: counters area, occupancy bitmap, slots.

use std::fmt;

use crate::primitives::bytes::{be, bits};
use crate::types::{entry_crc32, SegmentIndex, TierIndex};

use super::layout::{counters, entry, Geometry, ENTRY_HEADER_LEN, TIER_COUNTERS_LEN};

/// A decoded, checksum-verified entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Key bytes.
    pub key: &'a [u8],
    /// Value bytes.
    pub value: &'a [u8],
}

/// Why a live slot does not hold a usable entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryDefect {
    /// Key and value lengths run past the slot.
    LengthOverflow {
        /// Stored key length.
        key_len: u16,
        /// Stored value length.
        value_len: u16,
    },
    /// Key length is zero.
    EmptyKey,
    /// Stored checksum disagrees with the slot contents.
    ChecksumMismatch {
        /// Checksum found in the slot.
        stored: u32,
        /// Checksum computed from the slot contents.
        computed: u32,
    },
}

impl fmt::Display for EntryDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDefect::LengthOverflow { key_len, value_len } => {
                write!(f, "lengths overflow slot (key={key_len} value={value_len})")
            }
            EntryDefect::EmptyKey => write!(f, "empty key"),
            EntryDefect::ChecksumMismatch { stored, computed } => {
                write!(f, "checksum mismatch (stored={stored:#010x} computed={computed:#010x})")
            }
        }
    }
}

fn slot_range(geometry: &Geometry, slot: usize) -> std::ops::Range<usize> {
    let start = TIER_COUNTERS_LEN + geometry.bitmap_len() + slot * geometry.entry_size as usize;
    start..start + geometry.entry_size as usize
}

fn bitmap_range(geometry: &Geometry) -> std::ops::Range<usize> {
    TIER_COUNTERS_LEN..TIER_COUNTERS_LEN + geometry.bitmap_len()
}

fn decode_slot(buf: &[u8]) -> Result<Entry<'_>, EntryDefect> {
    let stored = be::get_u32(buf, entry::CRC32);
    let key_len = be::get_u16(buf, entry::KEY_LEN);
    let value_len = be::get_u16(buf, entry::VALUE_LEN);
    let body = &buf[ENTRY_HEADER_LEN..];
    let key_end = key_len as usize;
    let value_end = key_end + value_len as usize;
    if value_end > body.len() {
        return Err(EntryDefect::LengthOverflow { key_len, value_len });
    }
    if key_len == 0 {
        return Err(EntryDefect::EmptyKey);
    }
    let key = &body[..key_end];
    let value = &body[key_end..value_end];
    let computed = entry_crc32(key, value);
    if computed != stored {
        return Err(EntryDefect::ChecksumMismatch { stored, computed });
    }
    Ok(Entry { key, value })
}

/// Read-only view of one tier.
#[derive(Clone, Copy)]
pub struct TierRef<'a> {
    buf: &'a [u8],
    geometry: &'a Geometry,
}

impl<'a> TierRef<'a> {
    pub(crate) fn new(buf: &'a [u8], geometry: &'a Geometry) -> Self {
        debug_assert_eq!(buf.len(), geometry.tier_len());
        Self { buf, geometry }
    }

    /// Forward chain link.
    pub fn next_tier_index(&self) -> TierIndex {
        TierIndex(be::get_u64(self.buf, counters::NEXT_TIER_INDEX))
    }

    /// Backward chain link, or the free-list link of an unused tier.
    pub fn prev_tier_index(&self) -> TierIndex {
        TierIndex(be::get_u64(self.buf, counters::PREV_TIER_INDEX))
    }

    /// Stored owning segment; meaningful for overflow tiers only.
    pub fn segment_index(&self) -> SegmentIndex {
        SegmentIndex(be::get_u32(self.buf, counters::SEGMENT_INDEX))
    }

    /// Chain position, 0 for the primary tier.
    pub fn depth(&self) -> u32 {
        be::get_u32(self.buf, counters::DEPTH)
    }

    /// Stored live entry count.
    pub fn entries(&self) -> u32 {
        be::get_u32(self.buf, counters::ENTRIES)
    }

    /// Returns true if `slot` is marked live in the bitmap.
    pub fn is_live(&self, slot: usize) -> bool {
        bits::test(&self.buf[bitmap_range(self.geometry)], slot)
    }

    /// Live slot count according to the bitmap.
    pub fn live_count(&self) -> usize {
        bits::count(
            &self.buf[bitmap_range(self.geometry)],
            self.geometry.entries_per_tier as usize,
        )
    }

    /// First slot not marked live.
    pub fn first_free_slot(&self) -> Option<usize> {
        bits::first_clear(
            &self.buf[bitmap_range(self.geometry)],
            self.geometry.entries_per_tier as usize,
        )
    }

    /// Decodes the entry stored in `slot`, whether or not it is live.
    pub fn entry(&self, slot: usize) -> Result<Entry<'a>, EntryDefect> {
        decode_slot(&self.buf[slot_range(self.geometry, slot)])
    }

    /// Live slots in ascending order.
    pub fn live_slots(&self) -> impl Iterator<Item = usize> + 'a {
        let this = *self;
        (0..self.geometry.entries_per_tier as usize).filter(move |&slot| this.is_live(slot))
    }

    /// Finds the live slot holding `key`, skipping undecodable slots.
    pub fn find(&self, key: &[u8]) -> Option<(usize, Entry<'a>)> {
        self.live_slots().find_map(|slot| match self.entry(slot) {
            Ok(found) if found.key == key => Some((slot, found)),
            _ => None,
        })
    }
}

/// Mutable view of one tier.
pub struct TierMut<'a> {
    buf: &'a mut [u8],
    geometry: &'a Geometry,
}

impl<'a> TierMut<'a> {
    pub(crate) fn new(buf: &'a mut [u8], geometry: &'a Geometry) -> Self {
        debug_assert_eq!(buf.len(), geometry.tier_len());
        Self { buf, geometry }
    }

    /// Read-only view of the same tier.
    pub fn view(&self) -> TierRef<'_> {
        TierRef::new(self.buf, self.geometry)
    }

    /// Sets the forward chain link.
    pub fn set_next_tier_index(&mut self, tier: TierIndex) {
        be::put_u64(self.buf, counters::NEXT_TIER_INDEX, tier.0);
    }

    /// Sets the backward (or free-list) link.
    pub fn set_prev_tier_index(&mut self, tier: TierIndex) {
        be::put_u64(self.buf, counters::PREV_TIER_INDEX, tier.0);
    }

    /// Sets the stored owning segment.
    pub fn set_segment_index(&mut self, segment: SegmentIndex) {
        be::put_u32(self.buf, counters::SEGMENT_INDEX, segment.0);
    }

    /// Sets the chain position.
    pub fn set_depth(&mut self, depth: u32) {
        be::put_u32(self.buf, counters::DEPTH, depth);
    }

    /// Sets the stored live entry count.
    pub fn set_entries(&mut self, entries: u32) {
        be::put_u32(self.buf, counters::ENTRIES, entries);
    }

    /// Writes key and value into `slot` and marks it live.
    ///
    /// The caller checks that the payload fits the slot.
    pub fn write_entry(&mut self, slot: usize, key: &[u8], value: &[u8]) {
        let range = slot_range(self.geometry, slot);
        let dst = &mut self.buf[range];
        dst.fill(0);
        be::put_u32(dst, entry::CRC32, entry_crc32(key, value));
        be::put_u16(dst, entry::KEY_LEN, key.len() as u16);
        be::put_u16(dst, entry::VALUE_LEN, value.len() as u16);
        let body = &mut dst[ENTRY_HEADER_LEN..];
        body[..key.len()].copy_from_slice(key);
        body[key.len()..key.len() + value.len()].copy_from_slice(value);
        let bitmap = bitmap_range(self.geometry);
        bits::set(&mut self.buf[bitmap], slot);
    }

    /// Marks `slot` free. Slot bytes are left for forensics.
    pub fn clear_slot(&mut self, slot: usize) {
        let bitmap = bitmap_range(self.geometry);
        bits::clear(&mut self.buf[bitmap], slot);
    }

    /// Zeroes the counters area and the occupancy bitmap.
    pub fn zero_bookkeeping(&mut self) {
        let end = bitmap_range(self.geometry).end;
        self.buf[..end].fill(0);
    }
}
