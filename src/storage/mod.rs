//! Table storage: file layout, tier views, navigation, and pool allocation.
//!
//! Everything here addresses a single [`Region`](crate::primitives::io::Region)
//! by absolute offset. [`HashTable`] is the entry point; the cursor and
//! allocator live in their own modules as further `impl` blocks on it.

mod alloc;
mod cursor;
mod global;
/// On-disk layout constants and geometry.
pub mod layout;
mod options;
mod table;
mod tier;

pub use cursor::TierCursor;
pub use global::GlobalMutableState;
pub use layout::Geometry;
pub use options::{
    TableOptions, DEFAULT_ENTRIES_PER_TIER, DEFAULT_ENTRY_SIZE, DEFAULT_SEGMENTS,
    DEFAULT_TIERS_PER_BULK,
};
pub use table::HashTable;
pub use tier::{Entry, EntryDefect, TierMut, TierRef};
