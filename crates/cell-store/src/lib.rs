//! Per-cell time-series archives.
//!
//! The archive directory of a repurposing run holds one Zarr V3 hierarchy per
//! non-empty cell (`<cell:04>.zarr`) and a `grid.json` manifest that commits
//! the run. [`ArchiveWriter`] creates and appends archives,
//! [`TimeSeriesReader`] answers point queries.

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod reader;

pub use archive::{archive_path, parse_archive_name, ArchiveWriter, CellArchive, CellBlock, WriteOutcome};
pub use cache::{ArchiveCache, CacheStats, LoadedArchive};
pub use config::{CellStoreConfig, ZarrCompression};
pub use error::{StoreError, StoreResult};
pub use manifest::{GridManifest, MANIFEST_FILE};
pub use reader::{PointQuery, ReaderConfig, TimeSeries, TimeSeriesReader};
