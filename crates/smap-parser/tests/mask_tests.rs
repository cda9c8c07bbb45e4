//! Point masks read from gpi lists and netCDF land masks.

use std::path::Path;

use smap_parser::{PointMask, ReadError};
use test_utils::raster_grid;

const ROWS: usize = 4;
const COLS: usize = 6;

fn gpis(grid: &smap_common::Grid) -> Vec<u64> {
    grid.points().iter().map(|p| p.gpi).collect()
}

fn write_land_mask(path: &Path, name: &str, values: &[u8]) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("y", ROWS).unwrap();
    file.add_dimension("x", COLS).unwrap();
    let mut var = file.add_variable::<u8>(name, &["y", "x"]).unwrap();
    var.put_values(values, ..).unwrap();
}

// ============================================================================
// Text lists
// ============================================================================

#[test]
fn test_text_list() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("land.csv");
    std::fs::write(&path, "# land points\n7, 3\n12\n\n3\n").unwrap();

    let mask = PointMask::load(&path).unwrap();
    assert_eq!(mask, PointMask::Points(vec![3, 7, 12]));

    let grid = mask.apply(&raster_grid(ROWS, COLS, 10.0, 51.0, 0.5)).unwrap();
    assert_eq!(gpis(&grid), vec![3, 7, 12]);
    assert_eq!(grid.raster_shape(), Some(smap_common::RasterShape::new(ROWS, COLS)));
}

#[test]
fn test_text_list_rejects_garbage() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("land.txt");
    std::fs::write(&path, "1\nsea\n").unwrap();
    assert!(matches!(
        PointMask::load(&path),
        Err(ReadError::InvalidMask { .. })
    ));

    std::fs::write(&path, "# nothing\n").unwrap();
    assert!(matches!(
        PointMask::load(&path),
        Err(ReadError::InvalidMask { .. })
    ));
}

// ============================================================================
// netCDF masks
// ============================================================================

#[test]
fn test_netcdf_raster_mask() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("land.nc");
    let mut values = vec![0u8; ROWS * COLS];
    // file row 0 is the northern edge: gpi = (rows - 1 - row) * cols + col
    values[5] = 1;
    values[3 * COLS] = 1;
    write_land_mask(&path, "land_mask", &values);

    let mask = PointMask::load(&path).unwrap();
    assert_eq!(mask.kept(), 2);
    let grid = mask.apply(&raster_grid(ROWS, COLS, 10.0, 51.0, 0.5)).unwrap();
    assert_eq!(gpis(&grid), vec![0, 23]);
}

#[test]
fn test_netcdf_raster_mask_shape_checked() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mask.nc");
    write_land_mask(&path, "mask", &[1u8; ROWS * COLS]);

    let mask = PointMask::load(&path).unwrap();
    assert!(matches!(
        mask.apply(&raster_grid(COLS, ROWS, 10.0, 51.0, 0.5)),
        Err(ReadError::MaskShape { .. })
    ));
}

#[test]
fn test_netcdf_gpi_list() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("points.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("location", 3).unwrap();
        let mut var = file.add_variable::<i32>("gpi", &["location"]).unwrap();
        var.put_values(&[20i32, 4, 20], ..).unwrap();
    }

    let mask = PointMask::load(&path).unwrap();
    assert_eq!(mask, PointMask::Points(vec![4, 20]));
}

#[test]
fn test_netcdf_without_mask_variable() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("other.nc");
    write_land_mask(&path, "soil_moisture", &[0u8; ROWS * COLS]);
    assert!(matches!(
        PointMask::load(&path),
        Err(ReadError::InvalidMask { .. })
    ));
}
