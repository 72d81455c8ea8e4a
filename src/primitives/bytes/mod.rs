#![forbid(unsafe_code)]
//! Fixed-offset field accessors and bit helpers shared across storage layers.

pub mod be {
    //! Big-endian integer fields at absolute offsets within a byte region.
    //!
    //! Callers validate region bounds once (see `storage::cursor`); an
    //! out-of-range offset here is a layout bug and panics.

    /// Reads a big-endian u16 at `off`.
    pub fn get_u16(src: &[u8], off: usize) -> u16 {
        let b = field(src, off, 2);
        u16::from_be_bytes([b[0], b[1]])
    }

    /// Reads a big-endian u32 at `off`.
    pub fn get_u32(src: &[u8], off: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(field(src, off, 4));
        u32::from_be_bytes(bytes)
    }

    /// Reads a big-endian u64 at `off`.
    pub fn get_u64(src: &[u8], off: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(field(src, off, 8));
        u64::from_be_bytes(bytes)
    }

    /// Writes a big-endian u16 at `off`.
    pub fn put_u16(dst: &mut [u8], off: usize, v: u16) {
        field_mut(dst, off, 2).copy_from_slice(&v.to_be_bytes());
    }

    /// Writes a big-endian u32 at `off`.
    pub fn put_u32(dst: &mut [u8], off: usize, v: u32) {
        field_mut(dst, off, 4).copy_from_slice(&v.to_be_bytes());
    }

    /// Writes a big-endian u64 at `off`.
    pub fn put_u64(dst: &mut [u8], off: usize, v: u64) {
        field_mut(dst, off, 8).copy_from_slice(&v.to_be_bytes());
    }

    fn field(src: &[u8], off: usize, len: usize) -> &[u8] {
        src.get(off..off + len).unwrap_or_else(|| {
            panic!(
                "field read beyond region: off={} len={} region={}",
                off,
                len,
                src.len()
            )
        })
    }

    fn field_mut(dst: &mut [u8], off: usize, len: usize) -> &mut [u8] {
        let region = dst.len();
        dst.get_mut(off..off + len).unwrap_or_else(|| {
            panic!(
                "field write beyond region: off={} len={} region={}",
                off, len, region
            )
        })
    }
}

pub mod bits {
    //! Occupancy bitmap helpers, bit `i` lives in byte `i / 8`.

    /// Number of bytes needed for a bitmap of `bits` bits.
    pub const fn bitmap_len(bits: usize) -> usize {
        bits.div_ceil(8)
    }

    /// Returns true if bit `i` is set.
    pub fn test(map: &[u8], i: usize) -> bool {
        map[i / 8] & (1 << (i % 8)) != 0
    }

    /// Sets bit `i`.
    pub fn set(map: &mut [u8], i: usize) {
        map[i / 8] |= 1 << (i % 8);
    }

    /// Clears bit `i`.
    pub fn clear(map: &mut [u8], i: usize) {
        map[i / 8] &= !(1 << (i % 8));
    }

    /// Counts set bits among the first `bits` bits.
    pub fn count(map: &[u8], bits: usize) -> usize {
        (0..bits).filter(|&i| test(map, i)).count()
    }

    /// Index of the first clear bit below `bits`, if any.
    pub fn first_clear(map: &[u8], bits: usize) -> Option<usize> {
        (0..bits).find(|&i| !test(map, i))
    }
}
