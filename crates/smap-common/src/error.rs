//! Error types for grid and cell operations.

use thiserror::Error;

/// Result type alias using GridError.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised while building or querying a grid.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid selection matches no points")]
    EmptyGrid,

    #[error("grid point {0} is not part of the grid")]
    UnknownPoint(u64),

    #[error("duplicate grid point id {0}")]
    DuplicatePoint(u64),

    #[error("no grid point found near lon={lon}, lat={lat}")]
    PointNotFound { lon: f64, lat: f64 },

    #[error("invalid coordinate: lon={lon}, lat={lat}")]
    InvalidCoordinate { lon: f64, lat: f64 },

    #[error("invalid tile size: {0}")]
    InvalidTileSize(f64),

    #[error("raster shape {rows}x{cols} does not match axes of length {lats}x{lons}")]
    RasterShape {
        rows: usize,
        cols: usize,
        lats: usize,
        lons: usize,
    },
}
