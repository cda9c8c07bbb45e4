//! Image source backed by in-memory containers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use smap_common::Grid;

use crate::container::MemoryContainer;
use crate::error::{ReadError, ReadResult};
use crate::reader::{Alignment, Image, ImageRequest, ImageSource};

/// Serves images from containers registered per timestamp.
///
/// Containers follow the same layout rules as files: raster grids expect
/// `[rows, cols]` arrays, other grids 1-D arrays in point order.
pub struct MemoryImageSource {
    grid: Grid,
    alignment: Alignment,
    images: BTreeMap<DateTime<Utc>, MemoryContainer>,
}

impl MemoryImageSource {
    pub fn new(grid: Grid) -> ReadResult<Self> {
        let alignment = Alignment::for_grid(&grid)?;
        Ok(Self {
            grid,
            alignment,
            images: BTreeMap::new(),
        })
    }

    pub fn insert(&mut self, timestamp: DateTime<Utc>, container: MemoryContainer) {
        self.images.insert(timestamp, container);
    }

    pub fn with_image(mut self, timestamp: DateTime<Utc>, container: MemoryContainer) -> Self {
        self.insert(timestamp, container);
        self
    }

    fn origin(timestamp: DateTime<Utc>) -> PathBuf {
        PathBuf::from(format!("memory://{}", timestamp.to_rfc3339()))
    }
}

impl ImageSource for MemoryImageSource {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn read(&self, timestamp: DateTime<Utc>, request: &ImageRequest) -> ReadResult<Image> {
        let container = self
            .images
            .get(&timestamp)
            .ok_or_else(|| ReadError::MissingImage {
                date: timestamp.date_naive(),
                dir: Path::new("memory://").to_path_buf(),
            })?;
        self.alignment
            .read_image(container, &Self::origin(timestamp), timestamp, request)
    }

    fn last_available(&self) -> ReadResult<Option<NaiveDate>> {
        Ok(self.images.keys().next_back().map(|ts| ts.date_naive()))
    }
}
