use std::path::Path;

use crate::admin::error::AdminError;
use crate::admin::Result;
use crate::primitives::io::MappedRegion;
use crate::recovery::RecoveryReport;
use crate::storage::HashTable;

/// Runs crash recovery on the table at `path` and flushes the result.
///
/// Safe to run on a clean table: the report is then empty and nothing is
/// changed.
///
/// # Errors
///
/// Returns an error if the file is missing, its header is invalid, or a tier
/// cannot be interpreted at all. In the last case the file is left partially
/// repaired and must not be opened for use.
pub fn recover(path: impl AsRef<Path>) -> Result<RecoveryReport> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AdminError::missing_database(path));
    }
    let (_, report) = HashTable::recover(MappedRegion::open(path)?)?;
    Ok(report)
}
