use std::path::Path;

use serde::Serialize;

use crate::admin::error::AdminError;
use crate::admin::util::create_table;
use crate::admin::Result;
use crate::primitives::io::Region;
use crate::storage::TableOptions;

/// Outcome of [`create`].
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    /// Path of the new table file.
    pub path: String,
    /// Number of segments.
    pub segments: u32,
    /// Entry slots per tier.
    pub entries_per_tier: u32,
    /// Bytes per entry slot.
    pub entry_size: u32,
    /// Overflow tiers per bulk.
    pub tiers_per_bulk: u32,
    /// Bulks allocated at creation.
    pub allocated_bulks: u32,
    /// Bulk allocation ceiling.
    pub max_bulks: u32,
    /// Key hashing seed actually used.
    pub hash_seed: u64,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Creates a new, empty table file.
///
/// # Errors
///
/// Returns an error if `path` exists and `overwrite` is false, if the options
/// are invalid, or if the file cannot be created.
pub fn create(path: impl AsRef<Path>, opts: &TableOptions, overwrite: bool) -> Result<CreateReport> {
    let path = path.as_ref();
    if path.exists() && !overwrite {
        return Err(AdminError::already_exists(path));
    }
    let table = create_table(path, opts)?;
    let geometry = *table.geometry();
    let global = table.load_global();
    Ok(CreateReport {
        path: path.display().to_string(),
        segments: geometry.segment_count,
        entries_per_tier: geometry.entries_per_tier,
        entry_size: geometry.entry_size,
        tiers_per_bulk: geometry.tiers_per_bulk,
        allocated_bulks: global.allocated_bulks,
        max_bulks: geometry.max_bulks,
        hash_seed: geometry.hash_seed,
        size_bytes: table.region().len() as u64,
    })
}
