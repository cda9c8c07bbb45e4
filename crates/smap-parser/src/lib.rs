//! Reader for SMAP Level 3 soil moisture images.
//!
//! SMAP L3 products (SPL3SMP, SPL3SMP_E) are daily HDF5 files on the global
//! EASE-Grid 2.0. Each file holds one or two retrieval groups:
//!
//! - `Soil_Moisture_Retrieval_Data_AM`: descending (6 a.m.) overpass
//! - `Soil_Moisture_Retrieval_Data_PM`: ascending (6 p.m.) overpass, variable
//!   names suffixed `_pm`
//!
//! Files are opened through the netCDF-4 library. The reader locates the file
//! of a day, validates the requested variables against the container schema
//! and returns the values of every grid point with fill values masked as
//! `NaN`.
//!
//! A [`PointMask`] restricts the grid, e.g. to land points.

pub mod container;
pub mod error;
pub mod locator;
pub mod mask;
pub mod memory;
pub mod native;
pub mod overpass;
pub mod reader;

pub use container::{
    ArrayContainer, ContainerOpener, ContainerSchema, MemoryContainer, VariableSchema, ROOT_GROUP,
};
pub use error::{ReadError, ReadResult};
pub use locator::{FileLocator, SPL3SMP_E_PREFIX, SPL3SMP_PREFIX};
pub use mask::PointMask;
pub use memory::MemoryImageSource;
pub use native::{silence_hdf5_errors, NetcdfContainer, NetcdfOpener};
pub use overpass::{Overpass, AM_GROUP, PM_GROUP, SINGLE_GROUP};
pub use reader::{Image, ImageRequest, ImageSource, SmapImageReader};
