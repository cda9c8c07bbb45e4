//! Spatial partitioning of grid points into fixed-size lat/lon cells.
//!
//! Cells are numbered row-major over the global domain starting at
//! (-180°, -90°):
//!
//! ```text
//! row  = floor((lat + 90) / tile)
//! col  = floor((lon + 180) / tile)
//! cell = row * n_cols + col
//! ```
//!
//! lat = 90 and lon = 180 fall into the last row/column.

use std::collections::{BTreeMap, HashMap};

use crate::error::{GridError, GridResult};
use crate::grid::Grid;

/// Conventional cell size in degrees.
pub const DEFAULT_TILE_SIZE: f64 = 5.0;

/// Number of tiles needed to cover `extent` degrees.
fn tile_count(extent: f64, tile_size: f64) -> usize {
    let n = extent / tile_size;
    // 360 / 0.1 must yield 3600, not 3601
    if (n - n.round()).abs() < 1e-9 {
        n.round() as usize
    } else {
        n.ceil() as usize
    }
}

/// Cell grid dimensions as (rows, cols) for a tile size.
pub fn cell_dimensions(tile_size: f64) -> (usize, usize) {
    (tile_count(180.0, tile_size), tile_count(360.0, tile_size))
}

/// Cell index of a coordinate.
pub fn cell_for_coords(lon: f64, lat: f64, tile_size: f64) -> u32 {
    let (n_rows, n_cols) = cell_dimensions(tile_size);
    let row = (((lat + 90.0) / tile_size).floor().max(0.0) as usize).min(n_rows - 1);
    let col = (((lon + 180.0) / tile_size).floor().max(0.0) as usize).min(n_cols - 1);
    (row * n_cols + col) as u32
}

fn validate_tile_size(tile_size: f64) -> GridResult<()> {
    if !tile_size.is_finite() || tile_size <= 0.0 || tile_size > 180.0 {
        return Err(GridError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// Static point-to-cell mapping of a grid.
///
/// Membership is computed once at construction; each cell lists its points
/// in ascending gpi order.
#[derive(Debug, Clone)]
pub struct CellPartitioner {
    tile_size: f64,
    n_rows: usize,
    n_cols: usize,
    cells: HashMap<u64, u32>,
    members: BTreeMap<u32, Vec<u64>>,
}

impl CellPartitioner {
    pub fn new(grid: &Grid, tile_size: f64) -> GridResult<Self> {
        validate_tile_size(tile_size)?;
        let (n_rows, n_cols) = cell_dimensions(tile_size);

        let mut cells = HashMap::with_capacity(grid.len());
        let mut members: BTreeMap<u32, Vec<u64>> = BTreeMap::new();

        // grid points are already sorted, so member lists come out sorted
        for p in grid.points() {
            let cell = cell_for_coords(p.lon, p.lat, tile_size);
            cells.insert(p.gpi, cell);
            members.entry(cell).or_default().push(p.gpi);
        }

        Ok(Self {
            tile_size,
            n_rows,
            n_cols,
            cells,
            members,
        })
    }

    /// Partitioner with the default 5° tiles.
    pub fn with_default_tiles(grid: &Grid) -> GridResult<Self> {
        Self::new(grid, DEFAULT_TILE_SIZE)
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Cell grid dimensions as (rows, cols).
    pub fn dimensions(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn cell_of(&self, gpi: u64) -> GridResult<u32> {
        self.cells
            .get(&gpi)
            .copied()
            .ok_or(GridError::UnknownPoint(gpi))
    }

    /// Points of a cell in ascending gpi order; empty for cells without points.
    pub fn points_in(&self, cell: u32) -> &[u64] {
        self.members.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty cells in ascending order. Call again to restart.
    pub fn all_cells(&self) -> impl Iterator<Item = u32> + Clone + '_ {
        self.members.keys().copied()
    }

    /// Number of non-empty cells.
    pub fn num_cells(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPoint;

    #[test]
    fn test_cell_formula() {
        assert_eq!(cell_for_coords(0.0, 0.0, 5.0), 18 * 72 + 36);
        assert_eq!(cell_for_coords(-180.0, -90.0, 5.0), 0);
        assert_eq!(cell_for_coords(4.99, 4.99, 5.0), 18 * 72 + 36);
        assert_eq!(cell_for_coords(5.0, 0.0, 5.0), 18 * 72 + 37);
    }

    #[test]
    fn test_edges_clamp_to_last_cell() {
        assert_eq!(cell_for_coords(180.0, 90.0, 5.0), 36 * 72 - 1);
        assert_eq!(cell_for_coords(180.0, 0.0, 5.0), 18 * 72 + 71);
    }

    #[test]
    fn test_fractional_tile_dimensions() {
        assert_eq!(cell_dimensions(0.1), (1800, 3600));
        assert_eq!(cell_dimensions(7.0), (26, 52));
    }

    #[test]
    fn test_invalid_tile_size() {
        let grid = Grid::from_points(vec![GridPoint::new(0, 0.0, 0.0)]).unwrap();
        assert!(matches!(
            CellPartitioner::new(&grid, 0.0),
            Err(GridError::InvalidTileSize(_))
        ));
        assert!(CellPartitioner::new(&grid, f64::NAN).is_err());
    }
}
