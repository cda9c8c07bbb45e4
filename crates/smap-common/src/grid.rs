//! Grid definition: the fixed set of valid points of a product.
//!
//! Every point carries a stable integer identifier (gpi). For raster grids
//! the identifier is derived from the raster position with numbering
//! starting at the bottom-left corner:
//!
//! ```text
//! gpi = (rows - 1 - row) * cols + col
//! ```
//!
//! where row 0 is the first (northernmost) row of the product file.
//! Subsetting never renumbers points.

use std::collections::HashMap;
use std::sync::OnceLock;

use projection::{Ease2Global, Ease2Resolution};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GridError, GridResult};

/// Mean earth radius (meters) used to express search distances.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Squared chord length under which two candidates count as equidistant.
const TIE_EPSILON: f64 = 1e-15;

/// Position of a point in the product raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterPosition {
    pub row: usize,
    pub col: usize,
}

/// Raster dimensions of the full product grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterShape {
    pub rows: usize,
    pub cols: usize,
}

impl RasterShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of raster cells.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat row-major offset of a raster position.
    pub fn offset(&self, pos: RasterPosition) -> usize {
        pos.row * self.cols + pos.col
    }

    /// Identifier of the point at a raster position.
    pub fn gpi(&self, pos: RasterPosition) -> u64 {
        ((self.rows - 1 - pos.row) * self.cols + pos.col) as u64
    }
}

/// A single grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub gpi: u64,
    pub lon: f64,
    pub lat: f64,
    pub raster: Option<RasterPosition>,
}

impl GridPoint {
    pub fn new(gpi: u64, lon: f64, lat: f64) -> Self {
        Self {
            gpi,
            lon,
            lat,
            raster: None,
        }
    }
}

/// R-tree entry: a point on the unit sphere.
#[derive(Debug, Clone)]
struct IndexedPoint {
    xyz: [f64; 3],
    gpi: u64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.xyz[0] - point[0];
        let dy = self.xyz[1] - point[1];
        let dz = self.xyz[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn unit_vector(lon: f64, lat: f64) -> [f64; 3] {
    let (lon, lat) = (lon.to_radians(), lat.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

fn valid_coordinate(lon: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

/// Immutable set of grid points, ordered by ascending gpi.
pub struct Grid {
    points: Vec<GridPoint>,
    positions: HashMap<u64, usize>,
    raster: Option<RasterShape>,
    tree: OnceLock<RTree<IndexedPoint>>,
}

impl Grid {
    /// Build a grid from arbitrary points.
    pub fn from_points(points: Vec<GridPoint>) -> GridResult<Self> {
        Self::build(points, None)
    }

    /// Build a raster grid from its axes.
    ///
    /// `lons` holds one longitude per column (west to east), `lats` one
    /// latitude per row in file order (north to south).
    pub fn from_raster(lons: &[f64], lats: &[f64]) -> GridResult<Self> {
        let shape = RasterShape::new(lats.len(), lons.len());
        if shape.is_empty() {
            return Err(GridError::EmptyGrid);
        }

        let mut points = Vec::with_capacity(shape.len());
        // Bottom row first so that points come out in gpi order
        for row in (0..shape.rows).rev() {
            for (col, &lon) in lons.iter().enumerate() {
                let raster = RasterPosition { row, col };
                points.push(GridPoint {
                    gpi: shape.gpi(raster),
                    lon,
                    lat: lats[row],
                    raster: Some(raster),
                });
            }
        }

        Self::build(points, Some(shape))
    }

    /// Full global EASE-Grid 2.0 grid at the given resolution.
    pub fn ease2_global(resolution: Ease2Resolution) -> GridResult<Self> {
        let ease = Ease2Global::new(resolution);
        Self::from_raster(&ease.longitudes(), &ease.latitudes())
    }

    fn build(mut points: Vec<GridPoint>, raster: Option<RasterShape>) -> GridResult<Self> {
        if points.is_empty() {
            return Err(GridError::EmptyGrid);
        }

        points.sort_by_key(|p| p.gpi);

        let mut positions = HashMap::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            if !valid_coordinate(p.lon, p.lat) {
                return Err(GridError::InvalidCoordinate {
                    lon: p.lon,
                    lat: p.lat,
                });
            }
            if positions.insert(p.gpi, i).is_some() {
                return Err(GridError::DuplicatePoint(p.gpi));
            }
        }

        Ok(Self {
            points,
            positions,
            raster,
            tree: OnceLock::new(),
        })
    }

    /// All points in ascending gpi order.
    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shape of the full product raster, if the grid came from one.
    pub fn raster_shape(&self) -> Option<RasterShape> {
        self.raster
    }

    pub fn contains(&self, gpi: u64) -> bool {
        self.positions.contains_key(&gpi)
    }

    /// Position of a point in [`Grid::points`] order.
    pub fn index_of(&self, gpi: u64) -> GridResult<usize> {
        self.positions
            .get(&gpi)
            .copied()
            .ok_or(GridError::UnknownPoint(gpi))
    }

    pub fn point(&self, gpi: u64) -> GridResult<&GridPoint> {
        Ok(&self.points[self.index_of(gpi)?])
    }

    /// Reverse lookup: gpi to (lon, lat).
    pub fn coords(&self, gpi: u64) -> GridResult<(f64, f64)> {
        let p = self.point(gpi)?;
        Ok((p.lon, p.lat))
    }

    /// New grid holding the points matching `predicate`, ids preserved.
    pub fn subset<F>(&self, predicate: F) -> GridResult<Grid>
    where
        F: Fn(&GridPoint) -> bool,
    {
        let points: Vec<GridPoint> = self.points.iter().filter(|p| predicate(p)).copied().collect();
        Self::build(points, self.raster)
    }

    /// New grid holding the points inside `bbox` (edges inclusive).
    pub fn subset_bbox(&self, bbox: &BoundingBox) -> GridResult<Grid> {
        self.subset(|p| bbox.contains_point(p.lon, p.lat))
    }

    /// New grid holding exactly the given points.
    pub fn subset_gpis(&self, gpis: &[u64]) -> GridResult<Grid> {
        let mut points = Vec::with_capacity(gpis.len());
        for &gpi in gpis {
            points.push(*self.point(gpi)?);
        }
        Self::build(points, self.raster)
    }

    /// Nearest grid point to a coordinate and its great-circle distance in meters.
    ///
    /// Equidistant candidates resolve to the lowest gpi.
    pub fn nearest(&self, lon: f64, lat: f64) -> GridResult<(u64, f64)> {
        if !valid_coordinate(lon, lat) {
            return Err(GridError::InvalidCoordinate { lon, lat });
        }

        let tree = self.tree.get_or_init(|| {
            RTree::bulk_load(
                self.points
                    .iter()
                    .map(|p| IndexedPoint {
                        xyz: unit_vector(p.lon, p.lat),
                        gpi: p.gpi,
                    })
                    .collect(),
            )
        });

        let query = unit_vector(lon, lat);
        let mut candidates = tree.nearest_neighbor_iter_with_distance_2(&query);
        let (first, best_d2) = candidates
            .next()
            .ok_or(GridError::PointNotFound { lon, lat })?;

        let mut best = first.gpi;
        for (candidate, d2) in candidates {
            if d2 - best_d2 > TIE_EPSILON {
                break;
            }
            best = best.min(candidate.gpi);
        }

        let chord = best_d2.sqrt();
        let distance = 2.0 * (chord / 2.0).min(1.0).asin() * EARTH_RADIUS_M;
        Ok((best, distance))
    }

    /// Nearest grid point, failing if it lies further than `max_distance_m`.
    pub fn nearest_within(&self, lon: f64, lat: f64, max_distance_m: f64) -> GridResult<u64> {
        let (gpi, distance) = self.nearest(lon, lat)?;
        if distance > max_distance_m {
            return Err(GridError::PointNotFound { lon, lat });
        }
        Ok(gpi)
    }
}

impl Clone for Grid {
    fn clone(&self) -> Self {
        Self {
            points: self.points.clone(),
            positions: self.positions.clone(),
            raster: self.raster,
            tree: OnceLock::new(),
        }
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("points", &self.points.len())
            .field("raster", &self.raster)
            .finish()
    }
}
