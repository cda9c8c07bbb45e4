//! Zarr V3 cell archives.
//!
//! Each non-empty cell is stored as a Zarr hierarchy `<root>/<cell:04>.zarr`:
//!
//! ```text
//! zarr.json            group: cell, tile_size, variables, time_units
//! location_id/         int64   [n_points]
//! lon/, lat/           float64 [n_points]
//! time/                int64   [n_times], seconds since the epoch
//! <variable>/          float64 [n_points, n_times], fill value NaN
//! ```
//!
//! Points are ordered by ascending gpi and the time axis is strictly
//! increasing. Appending grows the time dimension and writes only the new
//! time range.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use smap_common::{GridPoint, VariableMeta, TIME_UNITS};
use tracing::{debug, warn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::config::{CellStoreConfig, ZarrCompression};
use crate::error::{StoreError, StoreResult};

const LOCATION_ID: &str = "/location_id";
const LON: &str = "/lon";
const LAT: &str = "/lat";
const TIME: &str = "/time";

/// Attribute holding the verbatim source attributes of a variable.
const SOURCE_ATTRIBUTES: &str = "source_attributes";

/// Directory of a cell archive.
pub fn archive_path(root: &Path, cell: u32) -> PathBuf {
    root.join(format!("{:04}.zarr", cell))
}

/// Cell number of an archive directory name, e.g. `1332.zarr`.
pub fn parse_archive_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".zarr")?;
    if stem.len() < 4 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn array_path(variable: &str) -> String {
    format!("/{}", variable)
}

fn open_store(path: &Path) -> StoreResult<Arc<FilesystemStore>> {
    let store = FilesystemStore::new(path).map_err(StoreError::zarr)?;
    Ok(Arc::new(store))
}

/// Data of one cell for a range of timestamps.
#[derive(Debug, Clone, Copy)]
pub struct CellBlock<'a> {
    pub cell: u32,
    /// Cell members in ascending gpi order.
    pub points: &'a [GridPoint],
    /// Seconds since the epoch, strictly increasing.
    pub times: &'a [i64],
    /// Row-major `[points, times]` values per variable.
    pub variables: &'a BTreeMap<String, Vec<f64>>,
    pub metadata: &'a BTreeMap<String, VariableMeta>,
}

/// Outcome of writing one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub created: bool,
    pub appended: usize,
    /// Timestamps not later than the archive's last one.
    pub dropped: usize,
}

/// Creates and appends cell archives below a root directory.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
    tile_size: f64,
    config: CellStoreConfig,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>, tile_size: f64, config: CellStoreConfig) -> Self {
        Self {
            root: root.into(),
            tile_size,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a block, creating the archive or appending to it.
    pub fn write_block(&self, block: &CellBlock<'_>) -> StoreResult<WriteOutcome> {
        validate_block(block)?;
        let path = archive_path(&self.root, block.cell);

        if path.join("zarr.json").exists() {
            self.append(&path, block)
        } else {
            self.create(&path, block)
        }
    }

    fn create(&self, path: &Path, block: &CellBlock<'_>) -> StoreResult<WriteOutcome> {
        std::fs::create_dir_all(path)?;
        let store = open_store(path)?;

        let n_points = block.points.len() as u64;
        let n_times = block.times.len() as u64;
        let point_chunk = self.config.point_chunk as u64;
        let time_chunk = self.config.time_chunk as u64;

        let mut attrs = Map::new();
        attrs.insert("cell".to_string(), json!(block.cell));
        attrs.insert("tile_size".to_string(), json!(self.tile_size));
        attrs.insert(
            "variables".to_string(),
            json!(block.variables.keys().collect::<Vec<_>>()),
        );
        attrs.insert("time_units".to_string(), json!(TIME_UNITS));

        let mut binding = GroupBuilder::new();
        let group = binding
            .attributes(attrs)
            .build(store.clone(), "/")
            .map_err(StoreError::zarr)?;
        group.store_metadata().map_err(StoreError::zarr)?;

        let ids: Vec<i64> = block.points.iter().map(|p| p.gpi as i64).collect();
        let lons: Vec<f64> = block.points.iter().map(|p| p.lon).collect();
        let lats: Vec<f64> = block.points.iter().map(|p| p.lat).collect();

        let spec = ArraySpec::new(vec![n_points], vec![point_chunk], DataType::Int64, FillValue::from(-1i64));
        self.build_array(&store, LOCATION_ID, spec, Map::new(), false)?
            .store_array_subset_elements(&whole(&[n_points])?, &ids)
            .map_err(StoreError::zarr)?;

        for (name, values, units) in [(LON, &lons, "degrees_east"), (LAT, &lats, "degrees_north")] {
            let mut attrs = Map::new();
            attrs.insert("units".to_string(), json!(units));
            let spec = ArraySpec::new(vec![n_points], vec![point_chunk], DataType::Float64, FillValue::from(f64::NAN));
            self.build_array(&store, name, spec, attrs, false)?
                .store_array_subset_elements(&whole(&[n_points])?, values)
                .map_err(StoreError::zarr)?;
        }

        for (variable, values) in block.variables {
            let attrs = variable_attributes(block.metadata.get(variable));
            let spec = ArraySpec::new(
                vec![n_points, n_times],
                vec![point_chunk, time_chunk],
                DataType::Float64,
                FillValue::from(f64::NAN),
            );
            self.build_array(&store, &array_path(variable), spec, attrs, true)?
                .store_array_subset_elements(&whole(&[n_points, n_times])?, values)
                .map_err(StoreError::zarr)?;
        }

        // time axis last: a readable time array marks a complete archive
        let mut attrs = Map::new();
        attrs.insert("units".to_string(), json!(TIME_UNITS));
        let spec = ArraySpec::new(vec![n_times], vec![time_chunk], DataType::Int64, FillValue::from(0i64));
        self.build_array(&store, TIME, spec, attrs, false)?
            .store_array_subset_elements(&whole(&[n_times])?, block.times)
            .map_err(StoreError::zarr)?;

        debug!(cell = block.cell, points = n_points, times = n_times, "Created cell archive");

        Ok(WriteOutcome {
            created: true,
            appended: block.times.len(),
            dropped: 0,
        })
    }

    fn append(&self, path: &Path, block: &CellBlock<'_>) -> StoreResult<WriteOutcome> {
        let archive = CellArchive::open_path(path, block.cell)?;

        let expected: Vec<u64> = block.points.iter().map(|p| p.gpi).collect();
        if archive.location_ids() != expected.as_slice() {
            return Err(StoreError::schema_mismatch(block.cell, "point membership differs from archive"));
        }
        let names: Vec<&str> = block.variables.keys().map(String::as_str).collect();
        if archive.variables().iter().map(String::as_str).collect::<Vec<_>>() != names {
            return Err(StoreError::schema_mismatch(
                block.cell,
                format!("variables {:?} differ from archive {:?}", names, archive.variables()),
            ));
        }

        let last = archive.times().last().copied();
        let keep: Vec<usize> = block
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| last.map_or(true, |last| **t > last))
            .map(|(i, _)| i)
            .collect();
        let dropped = block.times.len() - keep.len();
        if dropped > 0 {
            warn!(
                cell = block.cell,
                dropped = dropped,
                last_time = last.unwrap_or_default(),
                "Dropping timestamps not later than the archive's last timestamp"
            );
        }
        if keep.is_empty() {
            return Ok(WriteOutcome {
                created: false,
                appended: 0,
                dropped,
            });
        }

        let n_points = block.points.len() as u64;
        let old_times = archive.times().len() as u64;
        let added = keep.len() as u64;
        let n_old = block.times.len();

        for (variable, values) in block.variables {
            let mut array = Array::open(archive.store.clone(), &array_path(variable))
                .map_err(StoreError::zarr)?;
            array.set_shape(vec![n_points, old_times + added]);
            array.store_metadata().map_err(StoreError::zarr)?;

            let mut selected = Vec::with_capacity(block.points.len() * keep.len());
            for row in 0..block.points.len() {
                selected.extend(keep.iter().map(|&t| values[row * n_old + t]));
            }
            let subset = ArraySubset::new_with_start_shape(vec![0, old_times], vec![n_points, added])
                .map_err(StoreError::zarr)?;
            array
                .store_array_subset_elements(&subset, &selected)
                .map_err(StoreError::zarr)?;
        }

        let new_times: Vec<i64> = keep.iter().map(|&i| block.times[i]).collect();
        let mut time = Array::open(archive.store.clone(), TIME).map_err(StoreError::zarr)?;
        time.set_shape(vec![old_times + added]);
        time.store_metadata().map_err(StoreError::zarr)?;
        let subset = ArraySubset::new_with_start_shape(vec![old_times], vec![added])
            .map_err(StoreError::zarr)?;
        time.store_array_subset_elements(&subset, &new_times)
            .map_err(StoreError::zarr)?;

        debug!(cell = block.cell, appended = added, "Appended to cell archive");

        Ok(WriteOutcome {
            created: false,
            appended: keep.len(),
            dropped,
        })
    }

    fn build_array(
        &self,
        store: &Arc<FilesystemStore>,
        path: &str,
        spec: ArraySpec,
        attrs: Map<String, Value>,
        compress: bool,
    ) -> StoreResult<Array<FilesystemStore>> {
        let chunk_grid: zarrs::array::ChunkGrid = spec
            .chunks
            .try_into()
            .map_err(|e| StoreError::Config(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(spec.shape, spec.data_type, chunk_grid, spec.fill_value);
        let mut builder = binding.attributes(attrs);

        if compress && self.config.compression != ZarrCompression::None {
            let codec = self.create_compression_codec()?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(store.clone(), path)
            .map_err(StoreError::zarr)?;
        array.store_metadata().map_err(StoreError::zarr)?;
        Ok(array)
    }

    /// Create the Blosc codec for float64 variable chunks.
    fn create_compression_codec(
        &self,
    ) -> StoreResult<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| StoreError::Config("Invalid compression level".to_string()))?;

        let shuffle = if self.config.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.config.shuffle { Some(8) } else { None };

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(StoreError::Config("No compression configured".to_string()))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

struct ArraySpec {
    shape: Vec<u64>,
    chunks: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
}

impl ArraySpec {
    fn new(shape: Vec<u64>, chunks: Vec<u64>, data_type: DataType, fill_value: FillValue) -> Self {
        Self {
            shape,
            chunks,
            data_type,
            fill_value,
        }
    }
}

fn whole(shape: &[u64]) -> StoreResult<ArraySubset> {
    ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.to_vec()).map_err(StoreError::zarr)
}

fn validate_block(block: &CellBlock<'_>) -> StoreResult<()> {
    if block.points.is_empty() || block.times.is_empty() {
        return Err(StoreError::schema_mismatch(block.cell, "empty block"));
    }
    if !block.points.windows(2).all(|w| w[0].gpi < w[1].gpi) {
        return Err(StoreError::schema_mismatch(block.cell, "points not in ascending gpi order"));
    }
    if !block.times.windows(2).all(|w| w[0] < w[1]) {
        return Err(StoreError::schema_mismatch(block.cell, "timestamps not strictly increasing"));
    }
    let expected = block.points.len() * block.times.len();
    for (name, values) in block.variables {
        if values.len() != expected {
            return Err(StoreError::schema_mismatch(
                block.cell,
                format!("variable {} has {} values, expected {}", name, values.len(), expected),
            ));
        }
    }
    Ok(())
}

fn variable_attributes(meta: Option<&VariableMeta>) -> Map<String, Value> {
    let mut attrs = Map::new();
    let Some(meta) = meta else {
        return attrs;
    };

    if let Some(units) = &meta.units {
        attrs.insert("units".to_string(), json!(units));
    }
    if let Some(long_name) = &meta.long_name {
        attrs.insert("long_name".to_string(), json!(long_name));
    }
    if let Some(fill) = meta.fill_value {
        attrs.insert("source_fill_value".to_string(), json!(fill));
    }
    if let Some(min) = meta.valid_min {
        attrs.insert("valid_min".to_string(), json!(min));
    }
    if let Some(max) = meta.valid_max {
        attrs.insert("valid_max".to_string(), json!(max));
    }
    attrs.insert(
        SOURCE_ATTRIBUTES.to_string(),
        Value::Object(meta.attributes.clone().into_iter().collect()),
    );
    attrs
}

/// Read access to one cell archive.
///
/// Coordinates, ids and the time axis are loaded on open; variable data is
/// read on demand.
pub struct CellArchive {
    cell: u32,
    path: PathBuf,
    store: Arc<FilesystemStore>,
    tile_size: f64,
    variables: Vec<String>,
    location_ids: Vec<u64>,
    lons: Vec<f64>,
    lats: Vec<f64>,
    times: Vec<i64>,
}

impl CellArchive {
    pub fn open(root: &Path, cell: u32) -> StoreResult<Self> {
        Self::open_path(&archive_path(root, cell), cell)
    }

    fn open_path(path: &Path, cell: u32) -> StoreResult<Self> {
        if !path.join("zarr.json").exists() {
            return Err(StoreError::CellArchiveMissing {
                cell,
                path: path.to_path_buf(),
            });
        }

        let store = open_store(path)?;
        let group = Group::open(store.clone(), "/").map_err(StoreError::zarr)?;
        let attrs = group.attributes();

        let variables = attrs
            .get("variables")
            .and_then(Value::as_array)
            .map(|vars| {
                vars.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .ok_or_else(|| StoreError::schema_mismatch(cell, "missing variables attribute"))?;
        let tile_size = attrs
            .get("tile_size")
            .and_then(Value::as_f64)
            .ok_or_else(|| StoreError::schema_mismatch(cell, "missing tile_size attribute"))?;

        let ids: Vec<i64> = read_vector(&store, LOCATION_ID)?;
        let lons = read_vector(&store, LON)?;
        let lats = read_vector(&store, LAT)?;
        let times = read_vector(&store, TIME)?;

        Ok(Self {
            cell,
            path: path.to_path_buf(),
            store,
            tile_size,
            variables,
            location_ids: ids.into_iter().map(|id| id as u64).collect(),
            lons,
            lats,
            times,
        })
    }

    pub fn cell(&self) -> u32 {
        self.cell
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Variable names, sorted.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Point ids in archive row order.
    pub fn location_ids(&self) -> &[u64] {
        &self.location_ids
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    /// Time axis in seconds since the epoch.
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    /// Row of a point in the archive.
    pub fn row_of(&self, gpi: u64) -> Option<usize> {
        self.location_ids.binary_search(&gpi).ok()
    }

    fn check_variable(&self, variable: &str) -> StoreResult<()> {
        if self.variables.iter().any(|v| v == variable) {
            Ok(())
        } else {
            Err(StoreError::schema_mismatch(
                self.cell,
                format!("variable {} not in archive", variable),
            ))
        }
    }

    /// The time series of one archive row.
    pub fn read_row(&self, row: usize, variable: &str) -> StoreResult<Vec<f64>> {
        self.check_variable(variable)?;
        let array = Array::open(self.store.clone(), &array_path(variable)).map_err(StoreError::zarr)?;
        let subset = ArraySubset::new_with_start_shape(
            vec![row as u64, 0],
            vec![1, self.times.len() as u64],
        )
        .map_err(StoreError::zarr)?;
        array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(StoreError::zarr)
    }

    /// A whole variable, row-major `[points, times]`.
    pub fn read_all(&self, variable: &str) -> StoreResult<Vec<f64>> {
        self.check_variable(variable)?;
        let array = Array::open(self.store.clone(), &array_path(variable)).map_err(StoreError::zarr)?;
        let subset = whole(&[self.location_ids.len() as u64, self.times.len() as u64])?;
        array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(StoreError::zarr)
    }

    /// Source metadata recorded for a variable.
    pub fn variable_meta(&self, variable: &str) -> StoreResult<VariableMeta> {
        self.check_variable(variable)?;
        let array = Array::open(self.store.clone(), &array_path(variable)).map_err(StoreError::zarr)?;
        let source = array
            .attributes()
            .get(SOURCE_ATTRIBUTES)
            .and_then(Value::as_object)
            .map(|obj| obj.clone().into_iter().collect())
            .unwrap_or_default();
        Ok(VariableMeta::from_attributes(variable, source))
    }
}

fn read_vector<T>(store: &Arc<FilesystemStore>, path: &str) -> StoreResult<Vec<T>>
where
    T: zarrs::array::ElementOwned,
{
    let array = Array::open(store.clone(), path).map_err(StoreError::zarr)?;
    let subset = whole(array.shape())?;
    array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(StoreError::zarr)
}
