use std::path::{Path, PathBuf};

use crate::types::TierHashError;
use thiserror::Error;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Table file not found at the specified path.
    #[error("table not found: {0}")]
    MissingDatabase(PathBuf),
    /// Refused to overwrite an existing table file.
    #[error("table already exists: {0}")]
    AlreadyExists(PathBuf),
    /// Core table error.
    #[error(transparent)]
    Core(#[from] TierHashError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_database(path: impl AsRef<Path>) -> Self {
        AdminError::MissingDatabase(path.as_ref().to_path_buf())
    }

    pub(crate) fn already_exists(path: impl AsRef<Path>) -> Self {
        AdminError::AlreadyExists(path.as_ref().to_path_buf())
    }
}
