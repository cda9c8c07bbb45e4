//! Error types for cell archives and the time-series reader.

use std::path::PathBuf;

use smap_common::GridError;
use thiserror::Error;

/// Errors that can occur while writing or reading cell archives.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No archive exists for a cell the manifest references.
    #[error("archive of cell {cell} not found at {path}")]
    CellArchiveMissing { cell: u32, path: PathBuf },

    /// A queried point is not part of the archived grid.
    #[error("point not found: {0}")]
    PointNotFound(String),

    /// The output directory holds no committed manifest.
    #[error("grid manifest not found at {0}")]
    ManifestMissing(PathBuf),

    /// Data to append does not match the existing archive layout.
    #[error("cell {cell}: {detail}")]
    SchemaMismatch { cell: u32, detail: String },

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// Invalid manifest contents.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl StoreError {
    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }

    pub fn schema_mismatch(cell: u32, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            cell,
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Manifest(err.to_string())
    }
}

/// Result type for cell store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
