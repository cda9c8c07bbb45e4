//! Run overview recorded next to the archives.
//!
//! `overview.yml` keeps the parameters of the run that produced an archive
//! directory so an extension run can continue it with the same settings.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smap_parser::Overpass;
use tracing::debug;

use crate::error::{RepurposeError, Result};

pub const OVERVIEW_FILE: &str = "overview.yml";

/// Description of the image source, recorded so extension runs can rebuild it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Grid name, e.g. "ease36".
    pub grid: String,
    /// Spatial subset as [min_lon, min_lat, max_lon, max_lat].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// Composite Release ID filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crid: Option<u32>,
    /// File name prefix of the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Point mask the grid was restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_points: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOverview {
    pub parameters: Vec<String>,
    pub overpass: Overpass,
    pub rename: bool,
    /// Time step in seconds.
    pub step: i64,
    pub tile_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub last_update: DateTime<Utc>,
}

impl RunOverview {
    pub fn path(root: &Path) -> PathBuf {
        root.join(OVERVIEW_FILE)
    }

    pub fn exists(root: &Path) -> bool {
        Self::path(root).is_file()
    }

    pub fn step_duration(&self) -> Duration {
        Duration::seconds(self.step)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.is_file() {
            return Err(RepurposeError::Overview(format!(
                "no run overview at {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(&path)?;
        let overview: Self = serde_yaml::from_str(&contents)?;
        if overview.step <= 0 {
            return Err(RepurposeError::Overview(format!(
                "invalid time step {} in {}",
                overview.step,
                path.display()
            )));
        }
        Ok(overview)
    }

    pub fn write(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        std::fs::write(&path, serde_yaml::to_string(self)?)?;
        debug!(path = %path.display(), last_day = %self.last_day, "Wrote run overview");
        Ok(())
    }
}
