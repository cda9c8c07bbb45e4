//! Point masks restricting a grid to a subset of its points.
//!
//! A mask is read either from a text file listing gpis (comma or line
//! separated, `#` starts a comment) or from a netCDF file holding a 1-D
//! `gpi` variable or a 2-D `land_mask` / `mask` raster in file order, where
//! nonzero cells are kept.

use std::path::Path;

use smap_common::{Grid, RasterShape};
use tracing::debug;

use crate::container::{ArrayContainer, ROOT_GROUP};
use crate::error::{ReadError, ReadResult};
use crate::native::NetcdfContainer;

/// Root variable holding a list of gpis.
pub const GPI_VARIABLE: &str = "gpi";
/// Root variables holding a raster mask, in lookup order.
pub const RASTER_MASK_VARIABLES: [&str; 2] = ["land_mask", "mask"];

#[derive(Debug, Clone, PartialEq)]
pub enum PointMask {
    /// Explicit point ids, ascending and unique.
    Points(Vec<u64>),
    /// Row-major raster in file order; `true` keeps the point.
    Raster { shape: RasterShape, keep: Vec<bool> },
}

impl PointMask {
    /// Mask keeping exactly the given points.
    pub fn from_gpis(gpis: impl IntoIterator<Item = u64>) -> Self {
        let mut gpis: Vec<u64> = gpis.into_iter().collect();
        gpis.sort_unstable();
        gpis.dedup();
        Self::Points(gpis)
    }

    /// Load a mask, choosing the format by file extension.
    pub fn load(path: &Path) -> ReadResult<Self> {
        let netcdf = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("nc" | "nc4" | "h5")
        );
        let mask = if netcdf {
            Self::from_netcdf(path)?
        } else {
            Self::from_text(path)?
        };
        debug!(path = %path.display(), kept = mask.kept(), "Loaded point mask");
        Ok(mask)
    }

    /// Read a gpi list, one or more comma separated ids per line.
    pub fn from_text(path: &Path) -> ReadResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| invalid(path, e.to_string()))?;

        let mut gpis = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| invalid(path, e.to_string()))?;
            let line = record.position().map_or(0, |p| p.line());
            for field in record.iter().filter(|f| !f.is_empty()) {
                let gpi = field
                    .parse::<u64>()
                    .map_err(|_| invalid(path, format!("line {}: '{}' is not a gpi", line, field)))?;
                gpis.push(gpi);
            }
        }

        if gpis.is_empty() {
            return Err(invalid(path, "no grid points listed".to_string()));
        }
        Ok(Self::from_gpis(gpis))
    }

    /// Read a `gpi` list or a raster mask from a netCDF file.
    pub fn from_netcdf(path: &Path) -> ReadResult<Self> {
        let container = NetcdfContainer::open(path)?;
        let schema = container.schema();

        if schema.variable(ROOT_GROUP, GPI_VARIABLE).is_some() {
            let values = container.read_variable(ROOT_GROUP, GPI_VARIABLE)?;
            let gpis = values
                .into_iter()
                .map(|v| {
                    if v >= 0.0 && v.fract() == 0.0 {
                        Ok(v as u64)
                    } else {
                        Err(invalid(path, format!("{} is not a gpi", v)))
                    }
                })
                .collect::<ReadResult<Vec<u64>>>()?;
            return Ok(Self::from_gpis(gpis));
        }

        for name in RASTER_MASK_VARIABLES {
            let Some(var) = schema.variable(ROOT_GROUP, name) else {
                continue;
            };
            let &[rows, cols] = var.shape.as_slice() else {
                return Err(invalid(
                    path,
                    format!("'{}' has shape {:?}, expected 2 dimensions", name, var.shape),
                ));
            };
            let keep = container
                .read_variable(ROOT_GROUP, name)?
                .into_iter()
                .map(|v| v.is_finite() && v != 0.0)
                .collect();
            return Ok(Self::Raster {
                shape: RasterShape::new(rows, cols),
                keep,
            });
        }

        Err(invalid(
            path,
            format!(
                "no '{}' variable and none of {:?}",
                GPI_VARIABLE, RASTER_MASK_VARIABLES
            ),
        ))
    }

    /// Number of points the mask keeps.
    pub fn kept(&self) -> usize {
        match self {
            Self::Points(gpis) => gpis.len(),
            Self::Raster { keep, .. } => keep.iter().filter(|k| **k).count(),
        }
    }

    /// New grid holding the masked points of `grid`, ids preserved.
    ///
    /// Listed points must belong to the grid. A raster mask must match the
    /// grid's raster shape.
    pub fn apply(&self, grid: &Grid) -> ReadResult<Grid> {
        match self {
            Self::Points(gpis) => Ok(grid.subset_gpis(gpis)?),
            Self::Raster { shape, keep } => {
                if grid.raster_shape() != Some(*shape) {
                    return Err(ReadError::MaskShape {
                        mask: *shape,
                        grid: grid.raster_shape(),
                    });
                }
                Ok(grid.subset(|p| p.raster.is_some_and(|pos| keep[shape.offset(pos)]))?)
            }
        }
    }
}

fn invalid(path: &Path, reason: String) -> ReadError {
    ReadError::InvalidMask {
        path: path.to_path_buf(),
        reason,
    }
}
