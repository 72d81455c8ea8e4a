//! Low-level primitives the table is built on.
//!
//! Includes fixed-offset byte codecs, the storage region abstraction, and
//! the segment lock word codec.

/// Byte-level utilities and encoding/decoding.
///
/// Big-endian field access at absolute offsets and occupancy bitmap helpers.
pub mod bytes;

/// Segment lock word encoding.
pub mod concurrency;

/// Storage regions: memory-mapped files and heap buffers.
pub mod io;
