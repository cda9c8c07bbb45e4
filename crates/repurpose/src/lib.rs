//! Repurposing of SMAP L3 images into per-cell time-series archives.
//!
//! [`Repurposer`] reads one image per timestamp from an
//! [`ImageSource`](smap_parser::ImageSource), splits it by cell and appends
//! each cell's window to its archive. The grid manifest written at the end
//! commits the run; `overview.yml` records its parameters for later
//! extension runs.
//!
//! # Example
//!
//! ```ignore
//! use repurpose::{RepurposeConfig, Repurposer, RunRequest};
//!
//! let repurposer = Repurposer::new(reader, "/data/smap_ts", RepurposeConfig::default())?;
//! let summary = repurposer.run(&RunRequest::new(start, end, ["soil_moisture"]))?;
//! ```

pub mod accumulator;
pub mod config;
pub mod error;
pub mod overview;
pub mod repurposer;

pub use accumulator::CellAccumulator;
pub use config::{MissingImagePolicy, RepurposeConfig};
pub use error::{RepurposeError, Result};
pub use overview::{RunOverview, SourceInfo, OVERVIEW_FILE};
pub use repurposer::{Repurposer, RunRequest, RunSummary};
