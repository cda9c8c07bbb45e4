//! Grid manifest: the commit record of a repurposing run.
//!
//! `grid.json` maps every archived point to its cell and coordinates. It is
//! written once all cell archives are flushed, through a temporary file that
//! is renamed into place, so its presence marks a complete output.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smap_common::{CellPartitioner, Grid, GridPoint};
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// File name of the manifest inside an output directory.
pub const MANIFEST_FILE: &str = "grid.json";

/// Column-oriented point table of an archive directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridManifest {
    pub tile_size: f64,
    pub gpi: Vec<u64>,
    pub cell: Vec<u32>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

impl GridManifest {
    pub fn path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    pub fn exists(root: &Path) -> bool {
        Self::path(root).is_file()
    }

    /// Manifest of a partitioned grid, in ascending gpi order.
    pub fn from_partition(grid: &Grid, partitioner: &CellPartitioner) -> StoreResult<Self> {
        let n = grid.len();
        let mut manifest = Self {
            tile_size: partitioner.tile_size(),
            gpi: Vec::with_capacity(n),
            cell: Vec::with_capacity(n),
            lon: Vec::with_capacity(n),
            lat: Vec::with_capacity(n),
        };

        for p in grid.points() {
            manifest.gpi.push(p.gpi);
            manifest.cell.push(partitioner.cell_of(p.gpi)?);
            manifest.lon.push(p.lon);
            manifest.lat.push(p.lat);
        }

        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.gpi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gpi.is_empty()
    }

    pub fn load(root: &Path) -> StoreResult<Self> {
        let path = Self::path(root);
        if !path.is_file() {
            return Err(StoreError::ManifestMissing(path));
        }

        let bytes = std::fs::read(&path)?;
        let manifest: Self = serde_json::from_slice(&bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> StoreResult<()> {
        let n = self.gpi.len();
        if self.cell.len() != n || self.lon.len() != n || self.lat.len() != n {
            return Err(StoreError::Manifest("column lengths differ".to_string()));
        }
        Ok(())
    }

    /// Write to `<root>/grid.json` atomically.
    pub fn write_atomic(&self, root: &Path) -> StoreResult<()> {
        self.validate()?;
        let bytes = serde_json::to_vec(self)?;

        let mut tmp = tempfile::NamedTempFile::new_in(root)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(Self::path(root)).map_err(|e| e.error)?;

        info!(root = %root.display(), points = self.len(), "Committed grid manifest");
        Ok(())
    }

    /// Remove the manifest, marking the output as uncommitted.
    pub fn remove(root: &Path) -> StoreResult<()> {
        match std::fs::remove_file(Self::path(root)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// gpi → cell lookup table.
    pub fn cell_index(&self) -> HashMap<u64, u32> {
        self.gpi.iter().copied().zip(self.cell.iter().copied()).collect()
    }

    /// Grid of the manifest points.
    pub fn to_grid(&self) -> StoreResult<Grid> {
        let points = (0..self.len())
            .map(|i| GridPoint::new(self.gpi[i], self.lon[i], self.lat[i]))
            .collect();
        Ok(Grid::from_points(points)?)
    }

    /// True if the manifest describes exactly this partitioned grid.
    pub fn matches(&self, grid: &Grid, partitioner: &CellPartitioner) -> bool {
        match Self::from_partition(grid, partitioner) {
            Ok(other) => other == *self,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::from_points(vec![
            GridPoint::new(1, 0.0, 0.0),
            GridPoint::new(2, 7.0, 0.0),
            GridPoint::new(3, 0.0, 4.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_write_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let grid = grid();
        let partitioner = CellPartitioner::new(&grid, 5.0).unwrap();
        let manifest = GridManifest::from_partition(&grid, &partitioner).unwrap();

        assert!(!GridManifest::exists(tmp.path()));
        manifest.write_atomic(tmp.path()).unwrap();
        assert!(GridManifest::exists(tmp.path()));

        let loaded = GridManifest::load(tmp.path()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.cell_index()[&2], 18 * 72 + 37);
        assert!(loaded.matches(&grid, &partitioner));

        // only the manifest is left behind, no temp files
        let entries = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_missing_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            GridManifest::load(tmp.path()),
            Err(StoreError::ManifestMissing(_))
        ));
        GridManifest::remove(tmp.path()).unwrap();
    }

    #[test]
    fn test_to_grid_preserves_ids() {
        let grid = grid();
        let partitioner = CellPartitioner::new(&grid, 5.0).unwrap();
        let manifest = GridManifest::from_partition(&grid, &partitioner).unwrap();
        let rebuilt = manifest.to_grid().unwrap();
        assert_eq!(rebuilt.points(), grid.points());
    }
}
