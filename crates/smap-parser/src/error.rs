//! Error types for image reading.

use std::path::PathBuf;

use chrono::NaiveDate;
use smap_common::{GridError, RasterShape};
use thiserror::Error;

/// Result type for image reader operations.
pub type ReadResult<T> = Result<T, ReadError>;

/// Errors raised while locating or reading an image.
#[derive(Error, Debug)]
pub enum ReadError {
    /// No container exists for the requested date.
    #[error("no image found for {date} in {dir}")]
    MissingImage { date: NaiveDate, dir: PathBuf },

    /// More than one container matches the requested date.
    #[error("{} images match {date}: {candidates:?}", .candidates.len())]
    AmbiguousImage {
        date: NaiveDate,
        candidates: Vec<PathBuf>,
    },

    /// A requested variable is absent from the container schema.
    #[error("variable '{variable}' not found in group '{group}'")]
    UnknownVariable { variable: String, group: String },

    /// No overpass was selected but the container holds several.
    #[error("multiple overpasses found in {path}: {found:?}, select one of AM, PM or BOTH")]
    AmbiguousOverpass { path: PathBuf, found: Vec<String> },

    /// The selected overpass layer does not exist in the container.
    #[error("overpass group '{group}' does not exist in {path}")]
    MissingOverpass { group: String, path: PathBuf },

    #[error("variable '{variable}' has shape {found:?}, grid expects {expected:?}")]
    ShapeMismatch {
        variable: String,
        found: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("grid point {0} has no raster position")]
    NoRasterPosition(u64),

    #[error("invalid point mask {path}: {reason}")]
    InvalidMask { path: PathBuf, reason: String },

    #[error("mask raster {mask:?} does not match grid raster {grid:?}")]
    MaskShape {
        mask: RasterShape,
        grid: Option<RasterShape>,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    /// Failure inside the array container library.
    #[error("container error: {0}")]
    Container(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// True for errors that only mean "no image for this timestamp".
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingImage { .. })
    }
}
