#![forbid(unsafe_code)]

use crc32fast::Hasher;

/// Checksum stored in front of every entry slot.
///
/// Covers the length prefixes as well as the payload so a torn length write
/// is caught even when the bytes it points at happen to be intact.
pub fn entry_crc32(key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&(key.len() as u16).to_be_bytes());
    hasher.update(&(value.len() as u16).to_be_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Checksum over the immutable part of the file header.
pub fn header_crc32(geometry: &[u8]) -> u32 {
    crc32fast::hash(geometry)
}
