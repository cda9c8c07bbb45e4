//! Image reading: one container per timestamp, values aligned to a grid.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use smap_common::{Grid, RasterShape, VariableMeta};
use tracing::debug;

use crate::container::{ArrayContainer, ContainerOpener};
use crate::error::{ReadError, ReadResult};
use crate::locator::FileLocator;
use crate::native::NetcdfOpener;
use crate::overpass::{resolve_layers, Overpass};

/// What to read from an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub variables: Vec<String>,
    pub overpass: Overpass,
    /// Suffix output names with the overpass.
    pub rename: bool,
}

impl ImageRequest {
    pub fn new<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            overpass: Overpass::default(),
            rename: false,
        }
    }

    pub fn with_overpass(mut self, overpass: Overpass) -> Self {
        self.overpass = overpass;
        self
    }

    pub fn with_rename(mut self, rename: bool) -> Self {
        self.rename = rename;
        self
    }
}

/// Values of one timestamp, aligned to the point order of the reader's grid.
///
/// Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, Vec<f64>>,
    pub metadata: BTreeMap<String, VariableMeta>,
}

impl Image {
    /// Output variable names, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn values(&self, variable: &str) -> Option<&[f64]> {
        self.data.get(variable).map(Vec::as_slice)
    }
}

/// Anything that yields images for timestamps on a fixed grid.
pub trait ImageSource {
    fn grid(&self) -> &Grid;

    fn read(&self, timestamp: DateTime<Utc>, request: &ImageRequest) -> ReadResult<Image>;

    /// Latest day with an image, if known.
    fn last_available(&self) -> ReadResult<Option<NaiveDate>>;
}

/// How container arrays map onto grid points.
#[derive(Debug, Clone)]
pub(crate) enum Alignment {
    /// 2-D `[rows, cols]` arrays, one flat offset per grid point.
    Raster {
        shape: RasterShape,
        offsets: Vec<usize>,
    },
    /// 1-D arrays already in grid point order.
    Flat { len: usize },
}

impl Alignment {
    pub(crate) fn for_grid(grid: &Grid) -> ReadResult<Self> {
        let Some(shape) = grid.raster_shape() else {
            return Ok(Self::Flat { len: grid.len() });
        };

        let offsets = grid
            .points()
            .iter()
            .map(|p| {
                p.raster
                    .map(|pos| shape.offset(pos))
                    .ok_or(ReadError::NoRasterPosition(p.gpi))
            })
            .collect::<ReadResult<Vec<_>>>()?;

        Ok(Self::Raster { shape, offsets })
    }

    fn expected_shape(&self) -> Vec<usize> {
        match self {
            Self::Raster { shape, .. } => vec![shape.rows, shape.cols],
            Self::Flat { len } => vec![*len],
        }
    }

    fn extract(&self, raw: &[f64], meta: &VariableMeta) -> Vec<f64> {
        match self {
            Self::Raster { offsets, .. } => offsets.iter().map(|&o| meta.mask(raw[o])).collect(),
            Self::Flat { .. } => raw.iter().map(|&v| meta.mask(v)).collect(),
        }
    }

    /// Read a request from an opened container.
    ///
    /// Every requested variable is checked against the schema before any
    /// data is read.
    pub(crate) fn read_image<C: ArrayContainer>(
        &self,
        container: &C,
        origin: &Path,
        timestamp: DateTime<Utc>,
        request: &ImageRequest,
    ) -> ReadResult<Image> {
        let schema = container.schema();
        let layers = resolve_layers(schema, request.overpass, request.rename, origin)?;
        let expected = self.expected_shape();

        let mut planned = Vec::new();
        for layer in &layers {
            for variable in &request.variables {
                let source = layer.source_name(variable);
                let var_schema = schema.variable(&layer.group, &source).ok_or_else(|| {
                    ReadError::UnknownVariable {
                        variable: source.clone(),
                        group: layer.group.clone(),
                    }
                })?;
                if var_schema.shape != expected {
                    return Err(ReadError::ShapeMismatch {
                        variable: source,
                        found: var_schema.shape.clone(),
                        expected,
                    });
                }
                planned.push((layer, source, layer.output_name(variable), var_schema));
            }
        }

        let mut image = Image {
            timestamp,
            data: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };

        for (layer, source, output, var_schema) in planned {
            let raw = container.read_variable(&layer.group, &source)?;
            if raw.len() != expected.iter().product::<usize>() {
                return Err(ReadError::ShapeMismatch {
                    variable: source,
                    found: vec![raw.len()],
                    expected,
                });
            }

            let meta = VariableMeta::from_attributes(output.clone(), var_schema.attributes.clone());
            image.data.insert(output.clone(), self.extract(&raw, &meta));
            image.metadata.insert(output, meta);
        }

        Ok(image)
    }
}

/// Reader of daily SMAP L3 files.
pub struct SmapImageReader<O: ContainerOpener = NetcdfOpener> {
    locator: FileLocator,
    grid: Grid,
    alignment: Alignment,
    opener: O,
}

impl SmapImageReader<NetcdfOpener> {
    pub fn new(locator: FileLocator, grid: Grid) -> ReadResult<Self> {
        Self::with_opener(locator, grid, NetcdfOpener)
    }
}

impl<O: ContainerOpener> SmapImageReader<O> {
    pub fn with_opener(locator: FileLocator, grid: Grid, opener: O) -> ReadResult<Self> {
        let alignment = Alignment::for_grid(&grid)?;
        Ok(Self {
            locator,
            grid,
            alignment,
            opener,
        })
    }

    pub fn locator(&self) -> &FileLocator {
        &self.locator
    }

    /// Read a request from an explicit file.
    pub fn read_file(
        &self,
        path: &Path,
        timestamp: DateTime<Utc>,
        request: &ImageRequest,
    ) -> ReadResult<Image> {
        let container = self.opener.open(path)?;
        let image = self
            .alignment
            .read_image(&container, path, timestamp, request)?;
        debug!(
            path = %path.display(),
            variables = image.data.len(),
            points = self.grid.len(),
            "Read image"
        );
        Ok(image)
    }
}

impl<O: ContainerOpener> ImageSource for SmapImageReader<O> {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn read(&self, timestamp: DateTime<Utc>, request: &ImageRequest) -> ReadResult<Image> {
        let path = self.locator.locate(timestamp.date_naive())?;
        self.read_file(&path, timestamp, request)
    }

    fn last_available(&self) -> ReadResult<Option<NaiveDate>> {
        Ok(self.locator.last_available())
    }
}
