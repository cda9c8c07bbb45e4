//! Point time-series reader over a committed archive directory.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smap_common::{time::from_epoch_seconds, Grid, GridError};
use tracing::debug;

use crate::archive::CellArchive;
use crate::cache::{ArchiveCache, CacheStats, LoadedArchive};
use crate::error::{StoreError, StoreResult};
use crate::manifest::GridManifest;

/// Reader behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Load whole cell archives and keep them cached.
    pub bulk: bool,
    /// Number of cells kept in the bulk cache.
    pub cache_slots: usize,
    /// Maximum distance for coordinate lookups, in meters.
    pub max_distance_m: Option<f64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            bulk: false,
            cache_slots: 64,
            max_distance_m: None,
        }
    }
}

/// A point lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointQuery {
    Gpi(u64),
    LonLat { lon: f64, lat: f64 },
}

/// Full temporal record of one point.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub gpi: u64,
    pub lon: f64,
    pub lat: f64,
    pub cell: u32,
    pub index: Vec<DateTime<Utc>>,
    /// One column per variable, aligned to `index`; `NaN` is missing.
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, variable: &str) -> Option<&[f64]> {
        self.columns.get(variable).map(Vec::as_slice)
    }

    /// Value at a position, `None` when missing.
    pub fn value(&self, variable: &str, position: usize) -> Option<f64> {
        let v = *self.columns.get(variable)?.get(position)?;
        (!v.is_nan()).then_some(v)
    }
}

/// Reads point time series from cell archives.
///
/// Queries that fail leave the reader usable. The cache is private to the
/// instance.
pub struct TimeSeriesReader {
    root: PathBuf,
    manifest: GridManifest,
    grid: Grid,
    cells: HashMap<u64, u32>,
    config: ReaderConfig,
    cache: Mutex<ArchiveCache>,
}

fn cache_for(config: &ReaderConfig) -> ArchiveCache {
    ArchiveCache::new(NonZeroUsize::new(config.cache_slots).unwrap_or(NonZeroUsize::MIN))
}

impl TimeSeriesReader {
    pub fn open(root: impl Into<PathBuf>, config: ReaderConfig) -> StoreResult<Self> {
        let root = root.into();
        let manifest = GridManifest::load(&root)?;
        let grid = manifest.to_grid()?;
        let cells = manifest.cell_index();

        debug!(root = %root.display(), points = manifest.len(), bulk = config.bulk, "Opened time-series reader");

        Ok(Self {
            cache: Mutex::new(cache_for(&config)),
            root,
            manifest,
            grid,
            cells,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &GridManifest {
        &self.manifest
    }

    /// Grid of all archived points.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Change the reader mode. Drops every cached archive.
    pub fn reconfigure(&mut self, config: ReaderConfig) {
        self.cache = Mutex::new(cache_for(&config));
        self.config = config;
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> MutexGuard<'_, ArchiveCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolve a query to a gpi.
    pub fn resolve(&self, query: PointQuery) -> StoreResult<u64> {
        match query {
            PointQuery::Gpi(gpi) if self.cells.contains_key(&gpi) => Ok(gpi),
            PointQuery::Gpi(gpi) => Err(StoreError::PointNotFound(format!("gpi {}", gpi))),
            PointQuery::LonLat { lon, lat } => {
                let found = match self.config.max_distance_m {
                    Some(max) => self.grid.nearest_within(lon, lat, max),
                    None => self.grid.nearest(lon, lat).map(|(gpi, _)| gpi),
                };
                found.map_err(|e| match e {
                    GridError::PointNotFound { .. } | GridError::InvalidCoordinate { .. } => {
                        StoreError::PointNotFound(format!("lon {} lat {}", lon, lat))
                    }
                    other => other.into(),
                })
            }
        }
    }

    pub fn read_gpi(&self, gpi: u64, variables: &[String]) -> StoreResult<TimeSeries> {
        self.read(PointQuery::Gpi(gpi), variables)
    }

    pub fn read_lonlat(&self, lon: f64, lat: f64, variables: &[String]) -> StoreResult<TimeSeries> {
        self.read(PointQuery::LonLat { lon, lat }, variables)
    }

    /// Read a point. An empty `variables` list reads every archived variable.
    pub fn read(&self, query: PointQuery, variables: &[String]) -> StoreResult<TimeSeries> {
        let gpi = self.resolve(query)?;
        let cell = self
            .cells
            .get(&gpi)
            .copied()
            .ok_or_else(|| StoreError::PointNotFound(format!("gpi {}", gpi)))?;
        let (lon, lat) = self.grid.coords(gpi)?;

        let mut series = if self.config.bulk {
            self.read_cached(gpi, cell, variables)?
        } else {
            self.read_direct(gpi, cell, variables)?
        };
        series.lon = lon;
        series.lat = lat;
        Ok(series)
    }

    fn read_direct(&self, gpi: u64, cell: u32, variables: &[String]) -> StoreResult<TimeSeries> {
        let archive = CellArchive::open(&self.root, cell)?;
        let row = row_in(&archive, gpi)?;
        let selected = select_variables(&archive, variables)?;

        let mut columns = BTreeMap::new();
        for variable in selected {
            let values = archive.read_row(row, &variable)?;
            columns.insert(variable, values);
        }

        build_series(gpi, cell, archive.times(), columns)
    }

    fn read_cached(&self, gpi: u64, cell: u32, variables: &[String]) -> StoreResult<TimeSeries> {
        let cached = self.lock_cache().get(cell);
        let loaded = match cached {
            Some(loaded) => loaded,
            None => {
                let loaded = Arc::new(LoadedArchive::load(CellArchive::open(&self.root, cell)?)?);
                self.lock_cache().insert(cell, loaded.clone());
                loaded
            }
        };

        let row = row_in(&loaded.archive, gpi)?;
        let selected = select_variables(&loaded.archive, variables)?;

        let mut columns = BTreeMap::new();
        for variable in selected {
            let values = loaded
                .row(row, &variable)
                .map(<[f64]>::to_vec)
                .unwrap_or_default();
            columns.insert(variable, values);
        }

        build_series(gpi, cell, loaded.archive.times(), columns)
    }
}

fn row_in(archive: &CellArchive, gpi: u64) -> StoreResult<usize> {
    archive
        .row_of(gpi)
        .ok_or_else(|| StoreError::schema_mismatch(archive.cell(), format!("gpi {} missing from archive", gpi)))
}

fn select_variables(archive: &CellArchive, variables: &[String]) -> StoreResult<Vec<String>> {
    if variables.is_empty() {
        return Ok(archive.variables().to_vec());
    }
    for variable in variables {
        if !archive.variables().contains(variable) {
            return Err(StoreError::schema_mismatch(
                archive.cell(),
                format!("variable {} not in archive", variable),
            ));
        }
    }
    Ok(variables.to_vec())
}

fn build_series(
    gpi: u64,
    cell: u32,
    times: &[i64],
    columns: BTreeMap<String, Vec<f64>>,
) -> StoreResult<TimeSeries> {
    let index = times
        .iter()
        .map(|&t| {
            from_epoch_seconds(t)
                .ok_or_else(|| StoreError::schema_mismatch(cell, format!("invalid timestamp {}", t)))
        })
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(TimeSeries {
        gpi,
        lon: f64::NAN,
        lat: f64::NAN,
        cell,
        index,
        columns,
    })
}
