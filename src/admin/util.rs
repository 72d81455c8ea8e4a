use std::fs;
use std::path::Path;

use tracing::info;

use crate::primitives::io::MappedRegion;
use crate::storage::layout::HEADER_LEN;
use crate::storage::{HashTable, TableOptions};

use crate::admin::error::{AdminError, Result};
use crate::admin::options::AdminOpenOptions;

/// Opens the table at `path`, creating it when allowed.
///
/// # Errors
///
/// Returns an error if the table doesn't exist and `create_if_missing` is false,
/// if a segment lock is still held from a crash, or if the header is invalid.
pub fn open_table(path: &Path, opts: &AdminOpenOptions) -> Result<HashTable<MappedRegion>> {
    if !path.exists() {
        if opts.create_if_missing {
            return create_table(path, &opts.table);
        } else {
            return Err(AdminError::missing_database(path));
        }
    }
    Ok(HashTable::open(MappedRegion::open(path)?)?)
}

/// Maps an existing table without the clean-shutdown check.
pub(crate) fn attach_table(path: &Path) -> Result<HashTable<MappedRegion>> {
    if !path.exists() {
        return Err(AdminError::missing_database(path));
    }
    Ok(HashTable::attach(MappedRegion::open(path)?)?)
}

pub(crate) fn create_table(path: &Path, table: &TableOptions) -> Result<HashTable<MappedRegion>> {
    ensure_parent_dir(path)?;
    let region = MappedRegion::create(path, HEADER_LEN)?;
    let table = HashTable::create(region, table)?;
    info!(path = %path.display(), "admin.create_table");
    Ok(table)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
