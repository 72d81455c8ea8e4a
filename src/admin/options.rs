use crate::storage::TableOptions;

/// Common options used when opening a table for administrative commands.
#[derive(Clone, Debug, Default)]
pub struct AdminOpenOptions {
    /// Geometry used when a missing table is created.
    pub table: TableOptions,
    /// Whether to create the table if it doesn't exist.
    pub create_if_missing: bool,
}
