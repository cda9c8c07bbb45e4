//! Synthetic grids and fields.
//!
//! Values are deterministic so tests can recompute what a reader must return.

use smap_common::{Grid, GridPoint};

/// Axes of a small regular raster: longitudes west to east, latitudes north
/// to south (file order).
pub fn raster_axes(
    rows: usize,
    cols: usize,
    west: f64,
    north: f64,
    step: f64,
) -> (Vec<f64>, Vec<f64>) {
    let lons = (0..cols).map(|c| west + c as f64 * step).collect();
    let lats = (0..rows).map(|r| north - r as f64 * step).collect();
    (lons, lats)
}

/// Small raster grid with the given axes.
pub fn raster_grid(rows: usize, cols: usize, west: f64, north: f64, step: f64) -> Grid {
    let (lons, lats) = raster_axes(rows, cols, west, north, step);
    Grid::from_raster(&lons, &lats).expect("valid raster axes")
}

/// Four points (0,0)=1, (0,4)=2, (4,0)=3, (4,4)=4 given as (lat, lon).
pub fn four_point_grid() -> Grid {
    Grid::from_points(vec![
        GridPoint::new(1, 0.0, 0.0),
        GridPoint::new(2, 4.0, 0.0),
        GridPoint::new(3, 0.0, 4.0),
        GridPoint::new(4, 4.0, 4.0),
    ])
    .expect("valid points")
}

/// Soil-moisture-like value of a raster cell on a given day, in 0.05..0.45.
pub fn soil_moisture_value(row: usize, col: usize, day: usize) -> f32 {
    let k = (row * 31 + col * 17 + day * 7) % 41;
    0.05 + k as f32 * 0.01
}

/// Row-major field of [`soil_moisture_value`].
pub fn soil_moisture_field(rows: usize, cols: usize, day: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            data.push(soil_moisture_value(row, col, day));
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_axes() {
        let (lons, lats) = raster_axes(2, 3, 10.0, 51.0, 0.5);
        assert_eq!(lons, vec![10.0, 10.5, 11.0]);
        assert_eq!(lats, vec![51.0, 50.5]);
    }

    #[test]
    fn test_field_in_range() {
        let field = soil_moisture_field(8, 9, 3);
        assert_eq!(field.len(), 72);
        assert!(field.iter().all(|v| (0.05..=0.45).contains(v)));
    }

    #[test]
    fn test_four_point_grid() {
        let grid = four_point_grid();
        assert_eq!(grid.coords(3).unwrap(), (4.0, 0.0));
    }
}
