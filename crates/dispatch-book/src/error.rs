//! Error types for record updates

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for record updates
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors that can occur while applying an update
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The record key has no place in the sheet (unknown location, ship
    /// without a column, ship outside the sheet's rows)
    #[error("{key} not found in sheet '{sheet}'")]
    KeyNotFound { sheet: String, key: String },

    /// The workbook lacks a sheet the layout names
    #[error("Sheet '{0}' not found in workbook")]
    SheetMissing(String),

    /// The request is missing a field or a value cannot be coerced
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The store could not be read or written
    #[error("Storage error on {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    /// The layout table is invalid
    #[error("Invalid layout: {0}")]
    Layout(String),
}

/// Underlying cause of [`UpdateError::StorageIo`]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xlsx(#[from] dispatch_book_xlsx::XlsxError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl UpdateError {
    pub(crate) fn storage<E: Into<StorageError>>(path: &Path, source: E) -> Self {
        UpdateError::StorageIo {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        UpdateError::InvalidInput(message.into())
    }
}
