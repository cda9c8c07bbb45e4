//! EASE-Grid 2.0 global projection.
//!
//! SMAP Level 3 products are delivered on the global EASE-Grid 2.0
//! (EPSG:6933), a cylindrical equal-area projection on the WGS84 ellipsoid
//! with true scale at 30°N/S. Because the projection is cylindrical, every
//! raster column shares one longitude and every raster row one latitude.
//!
//! Row 0 is the northernmost row, as stored in the product files.

use std::f64::consts::PI;

use crate::error::{ProjectionError, ProjectionResult};

/// WGS84 semi-major axis (meters).
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// WGS84 first eccentricity.
const ECCENTRICITY: f64 = 0.081_819_190_842_6;
/// Latitude of true scale (degrees).
const STANDARD_PARALLEL: f64 = 30.0;

/// Supported EASE-Grid 2.0 global resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ease2Resolution {
    /// 36 km grid used by the standard SPL3SMP product.
    Km36,
    /// 9 km grid used by the enhanced SPL3SMP_E product.
    Km9,
}

impl Ease2Resolution {
    /// Nominal cell size in meters.
    pub fn cell_size(&self) -> f64 {
        match self {
            Self::Km36 => 36_032.220_840_584,
            Self::Km9 => 9_008.055_210_146,
        }
    }

    /// Raster dimensions as (rows, cols).
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            Self::Km36 => (406, 964),
            Self::Km9 => (1624, 3856),
        }
    }

    /// Parse from a short name ("ease36", "36km", "M36", ...).
    pub fn from_str(s: &str) -> ProjectionResult<Self> {
        match s.to_lowercase().as_str() {
            "ease36" | "36km" | "m36" | "36" => Ok(Self::Km36),
            "ease9" | "9km" | "m09" | "m9" | "9" => Ok(Self::Km9),
            other => Err(ProjectionError::UnknownGrid(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Km36 => "ease36",
            Self::Km9 => "ease9",
        }
    }
}

impl std::fmt::Display for Ease2Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// EASE-Grid 2.0 global grid at a fixed resolution.
#[derive(Debug, Clone)]
pub struct Ease2Global {
    resolution: Ease2Resolution,
    rows: usize,
    cols: usize,
    cell_size: f64,
    /// Projected x of the western edge (meters)
    x_min: f64,
    /// Projected y of the northern edge (meters)
    y_max: f64,
    /// Scale factor along the standard parallel
    k0: f64,
    /// Authalic q at the pole
    qp: f64,
}

impl Ease2Global {
    pub fn new(resolution: Ease2Resolution) -> Self {
        let (rows, cols) = resolution.dimensions();
        let cell_size = resolution.cell_size();

        let phi1 = STANDARD_PARALLEL.to_radians();
        let e2 = ECCENTRICITY * ECCENTRICITY;
        let k0 = phi1.cos() / (1.0 - e2 * phi1.sin().powi(2)).sqrt();

        Self {
            resolution,
            rows,
            cols,
            cell_size,
            x_min: -(cols as f64) / 2.0 * cell_size,
            y_max: (rows as f64) / 2.0 * cell_size,
            k0,
            qp: authalic_q(PI / 2.0),
        }
    }

    pub fn resolution(&self) -> Ease2Resolution {
        self.resolution
    }

    /// Grid dimensions as (rows, cols).
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Project geographic coordinates (degrees) to EASE2 meters.
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> ProjectionResult<(f64, f64)> {
        if !(-90.0..=90.0).contains(&lat_deg) || !(-180.0..=180.0).contains(&lon_deg) {
            return Err(ProjectionError::OutOfRange { lat: lat_deg, lon: lon_deg });
        }

        let x = SEMI_MAJOR_AXIS * self.k0 * lon_deg.to_radians();
        let y = SEMI_MAJOR_AXIS * authalic_q(lat_deg.to_radians()) / (2.0 * self.k0);
        Ok((x, y))
    }

    /// Inverse projection from EASE2 meters to (lat, lon) in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = ECCENTRICITY * ECCENTRICITY;
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let lon = x / (SEMI_MAJOR_AXIS * self.k0);

        let sin_beta = (2.0 * y * self.k0 / (SEMI_MAJOR_AXIS * self.qp)).clamp(-1.0, 1.0);
        let beta = sin_beta.asin();

        // Authalic latitude series expansion
        let lat = beta
            + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
            + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
            + (761.0 * e6 / 45360.0) * (6.0 * beta).sin();

        (lat.to_degrees(), lon.to_degrees())
    }

    /// Convert geographic coordinates to fractional grid indices (col, row).
    ///
    /// Integer values are cell centers.
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> ProjectionResult<(f64, f64)> {
        let (x, y) = self.forward(lat_deg, lon_deg)?;
        let col = (x - self.x_min) / self.cell_size - 0.5;
        let row = (self.y_max - y) / self.cell_size - 0.5;
        Ok((col, row))
    }

    /// Convert grid indices (col, row) to (lat, lon) in degrees.
    pub fn grid_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.x_min + (col + 0.5) * self.cell_size;
        let y = self.y_max - (row + 0.5) * self.cell_size;
        self.inverse(x, y)
    }

    /// Longitude of every column center, west to east.
    pub fn longitudes(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|col| self.grid_to_geo(col as f64, 0.0).1)
            .collect()
    }

    /// Latitude of every row center, north to south.
    pub fn latitudes(&self) -> Vec<f64> {
        (0..self.rows)
            .map(|row| self.grid_to_geo(0.0, row as f64).0)
            .collect()
    }
}

/// Authalic q(φ) for the WGS84 ellipsoid.
fn authalic_q(phi: f64) -> f64 {
    let e = ECCENTRICITY;
    let e2 = e * e;
    let sin_phi = phi.sin();
    let es = e * sin_phi;

    (1.0 - e2) * (sin_phi / (1.0 - es * es) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}
