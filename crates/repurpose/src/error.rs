//! Error types for the repurposing crate.

use cell_store::StoreError;
use chrono::NaiveDate;
use smap_common::{GridError, TimeParseError};
use smap_parser::ReadError;
use thiserror::Error;

/// Errors that can occur during a repurposing run.
#[derive(Error, Debug)]
pub enum RepurposeError {
    #[error("Failed to read image: {0}")]
    Read(#[from] ReadError),

    #[error("Failed to write archive: {0}")]
    Store(#[from] StoreError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("No images found between {start} and {end}")]
    NoImagesFound { start: NaiveDate, end: NaiveDate },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Run overview error: {0}")]
    Overview(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Failed to access output: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TimeParseError> for RepurposeError {
    fn from(err: TimeParseError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<serde_yaml::Error> for RepurposeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Overview(err.to_string())
    }
}

/// Result type for repurposing operations.
pub type Result<T> = std::result::Result<T, RepurposeError>;
