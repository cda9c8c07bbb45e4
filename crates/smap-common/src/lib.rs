//! Common types shared across the SMAP repurposing crates.
//!
//! - [`Grid`]: the fixed set of product grid points with stable ids
//! - [`CellPartitioner`]: static mapping of grid points to lat/lon cells
//! - [`DateRange`]: timestamp sequences for repurposing runs
//! - [`VariableMeta`]: per-variable metadata and missing-value masking

pub mod bbox;
pub mod cell;
pub mod error;
pub mod grid;
pub mod time;
pub mod variable;

pub use bbox::{BboxParseError, BoundingBox};
pub use cell::{cell_dimensions, cell_for_coords, CellPartitioner, DEFAULT_TILE_SIZE};
pub use error::{GridError, GridResult};
pub use grid::{Grid, GridPoint, RasterPosition, RasterShape, EARTH_RADIUS_M};
pub use projection::Ease2Resolution;
pub use time::{DateRange, TimeParseError, TIME_UNITS};
pub use variable::VariableMeta;
