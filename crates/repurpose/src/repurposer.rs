//! Image-to-time-series repurposing.
//!
//! A run walks the timestamps of a date range, reads one image per timestamp
//! and hands every cell its slice of the image. Cells are independent, so
//! accumulation and flushing fan out over a rayon pool; each accumulator is
//! touched by one worker at a time and output is identical for any pool size.
//!
//! The grid manifest is the commit point. It is removed before the first
//! archive write and rewritten after the final flush, so an output directory
//! without `grid.json` is an aborted run.

use std::path::{Path, PathBuf};

use cell_store::{
    archive_path, parse_archive_name, ArchiveWriter, CellArchive, GridManifest, StoreResult,
    WriteOutcome,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use smap_common::{CellPartitioner, DateRange, Grid};
use smap_parser::{Image, ImageRequest, ImageSource, Overpass};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::accumulator::CellAccumulator;
use crate::config::{MissingImagePolicy, RepurposeConfig};
use crate::error::{RepurposeError, Result};
use crate::overview::{RunOverview, SourceInfo};

/// Parameters of one repurposing run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub variables: Vec<String>,
    pub overpass: Overpass,
    pub rename: bool,
    pub step: Duration,
}

impl RunRequest {
    /// Daily AM run over `start..=end`.
    pub fn new<I, S>(start: NaiveDate, end: NaiveDate, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            start,
            end,
            variables: variables.into_iter().map(Into::into).collect(),
            overpass: Overpass::default(),
            rename: false,
            step: Duration::days(1),
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

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    fn image_request(&self) -> ImageRequest {
        ImageRequest::new(self.variables.iter().cloned())
            .with_overpass(self.overpass)
            .with_rename(self.rename)
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Images read and accumulated.
    pub processed: usize,
    /// Timestamps without an image.
    pub skipped: usize,
    /// Timestamps dropped because archives already held them.
    pub dropped: usize,
    /// Archives created by this run.
    pub created: usize,
    pub cells: usize,
    pub points: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub variables: Vec<String>,
}

impl RunSummary {
    fn record(&mut self, outcome: &WriteOutcome) {
        if outcome.created {
            self.created += 1;
        }
        self.dropped += outcome.dropped;
    }
}

/// Repurposes images of an [`ImageSource`] into cell archives under `output`.
pub struct Repurposer<S: ImageSource> {
    source: S,
    output: PathBuf,
    config: RepurposeConfig,
    partitioner: CellPartitioner,
    source_info: Option<SourceInfo>,
}

impl<S: ImageSource> Repurposer<S> {
    pub fn new(source: S, output: impl Into<PathBuf>, config: RepurposeConfig) -> Result<Self> {
        config.validate().map_err(RepurposeError::InvalidConfig)?;
        let partitioner = CellPartitioner::new(source.grid(), config.tile_size)?;

        Ok(Self {
            source,
            output: output.into(),
            config,
            partitioner,
            source_info: None,
        })
    }

    /// Source description written to the run overview.
    pub fn with_source_info(mut self, info: SourceInfo) -> Self {
        self.source_info = Some(info);
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn grid(&self) -> &Grid {
        self.source.grid()
    }

    pub fn partitioner(&self) -> &CellPartitioner {
        &self.partitioner
    }

    pub fn config(&self) -> &RepurposeConfig {
        &self.config
    }

    /// Run over `request.start..=request.end`.
    pub fn run(&self, request: &RunRequest) -> Result<RunSummary> {
        let timestamps = DateRange::new(request.start, request.end, request.step)?.timestamps();
        let image_request = request.image_request();
        let mut summary = RunSummary::default();

        info!(
            start = %request.start,
            end = %request.end,
            timestamps = timestamps.len(),
            variables = ?request.variables,
            overpass = %request.overpass,
            output = %self.output.display(),
            "Starting repurposing run"
        );

        let mut pending = timestamps.into_iter();

        // nothing is written until one image has been read successfully
        let mut first = None;
        for timestamp in pending.by_ref() {
            if let Some(image) = self.read_image(timestamp, &image_request, &mut summary)? {
                first = Some(image);
                break;
            }
        }
        let Some(first) = first else {
            return Err(RepurposeError::NoImagesFound {
                start: request.start,
                end: request.end,
            });
        };

        let variables: Vec<String> = first.data.keys().cloned().collect();
        std::fs::create_dir_all(&self.output)?;
        let previous = self.prepare_output(request, &variables)?;

        let pool = self.thread_pool()?;
        let writer = ArchiveWriter::new(&self.output, self.config.tile_size, self.config.store.clone());
        let mut accumulators = self.accumulators()?;
        summary.cells = accumulators.len();
        summary.points = self.grid().len();
        summary.variables = variables;

        let mut buffered = 0;
        let mut next = Some(first);
        while let Some(image) = next.take() {
            summary.processed += 1;
            summary.first.get_or_insert(image.timestamp);
            summary.last = Some(image.timestamp);

            pool.install(|| {
                accumulators.par_iter_mut().for_each(|acc| acc.push(&image));
            });
            buffered += 1;
            debug!(timestamp = %image.timestamp, buffered, "Accumulated image");

            if buffered >= self.config.image_buffer {
                self.flush(&pool, &mut accumulators, &writer, &mut summary)?;
                buffered = 0;
            }

            for timestamp in pending.by_ref() {
                if let Some(image) = self.read_image(timestamp, &image_request, &mut summary)? {
                    next = Some(image);
                    break;
                }
            }
        }

        if buffered > 0 {
            self.flush(&pool, &mut accumulators, &writer, &mut summary)?;
        }

        GridManifest::from_partition(self.grid(), &self.partitioner)?.write_atomic(&self.output)?;
        self.write_overview(request, previous.as_ref(), &summary)?;

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            dropped = summary.dropped,
            cells = summary.cells,
            created = summary.created,
            "Repurposing run complete"
        );

        Ok(summary)
    }

    /// Continue the run recorded in the output's overview up to the last
    /// available image.
    ///
    /// Returns `None` when no newer image exists.
    pub fn extend(&self) -> Result<Option<RunSummary>> {
        if !GridManifest::exists(&self.output) {
            return Err(RepurposeError::Overview(format!(
                "{} holds no committed run to extend",
                self.output.display()
            )));
        }
        let overview = RunOverview::load(&self.output)?;

        let Some(last_available) = self.source.last_available()? else {
            info!("No images available, nothing to extend");
            return Ok(None);
        };

        let start = overview.last_day + Duration::days(1);
        if last_available < start {
            info!(
                last_day = %overview.last_day,
                last_available = %last_available,
                "Archives are up to date"
            );
            return Ok(None);
        }

        let request = RunRequest::new(start, last_available, overview.parameters.clone())
            .with_overpass(overview.overpass)
            .with_rename(overview.rename)
            .with_step(overview.step_duration());

        self.run(&request).map(Some)
    }

    /// Read one image, applying the missing image policy.
    fn read_image(
        &self,
        timestamp: DateTime<Utc>,
        request: &ImageRequest,
        summary: &mut RunSummary,
    ) -> Result<Option<Image>> {
        match self.source.read(timestamp, request) {
            Ok(image) => Ok(Some(image)),
            Err(e) if e.is_missing() && self.config.missing_images == MissingImagePolicy::Skip => {
                warn!(timestamp = %timestamp, error = %e, "No image, skipping");
                summary.skipped += 1;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Uncommit the output before writing.
    ///
    /// An output with a manifest is extended; it must describe this grid and
    /// tile size, and the request must produce the variables its archives
    /// hold. A committed output is left untouched when either check fails.
    /// Without a manifest any archives are leftovers of an aborted run and are
    /// deleted. Returns the overview of the extended run.
    fn prepare_output(
        &self,
        request: &RunRequest,
        variables: &[String],
    ) -> Result<Option<RunOverview>> {
        if GridManifest::exists(&self.output) {
            let manifest = GridManifest::load(&self.output)?;
            if !manifest.matches(self.grid(), &self.partitioner) {
                return Err(RepurposeError::InvalidConfig(format!(
                    "{} holds archives of a different grid or tile size",
                    self.output.display()
                )));
            }

            let previous = if RunOverview::exists(&self.output) {
                Some(RunOverview::load(&self.output)?)
            } else {
                None
            };
            if let Some(previous) = &previous {
                check_overview(previous, request)?;
            }
            self.check_archive_variables(variables)?;

            GridManifest::remove(&self.output)?;
            info!(output = %self.output.display(), "Extending existing archives");
            return Ok(previous);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.output).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| RepurposeError::Io(e.into()))?;
            let is_archive = entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .and_then(parse_archive_name)
                    .is_some();
            if is_archive {
                std::fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(removed, output = %self.output.display(), "Removed archives of an uncommitted run");
        }

        Ok(None)
    }

    /// Compare the output variables against the first existing archive.
    fn check_archive_variables(&self, variables: &[String]) -> Result<()> {
        let Some(cell) = self
            .partitioner
            .all_cells()
            .find(|&cell| archive_path(&self.output, cell).is_dir())
        else {
            return Ok(());
        };

        let archive = CellArchive::open(&self.output, cell)?;
        let mut expected = variables.to_vec();
        expected.sort();
        if archive.variables() != expected.as_slice() {
            return Err(RepurposeError::InvalidConfig(format!(
                "run writes variables {:?} but archives in {} hold {:?}",
                expected,
                self.output.display(),
                archive.variables()
            )));
        }
        Ok(())
    }

    fn thread_pool(&self) -> Result<ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("repurpose-{}", i))
            .build()
            .map_err(|e| RepurposeError::ThreadPool(e.to_string()))
    }

    /// One accumulator per non-empty cell, in ascending cell order.
    fn accumulators(&self) -> Result<Vec<CellAccumulator>> {
        let grid = self.grid();
        self.partitioner
            .all_cells()
            .map(|cell| -> Result<CellAccumulator> {
                let gpis = self.partitioner.points_in(cell);
                let mut points = Vec::with_capacity(gpis.len());
                let mut indices = Vec::with_capacity(gpis.len());
                for &gpi in gpis {
                    points.push(*grid.point(gpi)?);
                    indices.push(grid.index_of(gpi)?);
                }
                Ok(CellAccumulator::new(cell, points, indices))
            })
            .collect()
    }

    fn flush(
        &self,
        pool: &ThreadPool,
        accumulators: &mut [CellAccumulator],
        writer: &ArchiveWriter,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let outcomes: Vec<StoreResult<Option<WriteOutcome>>> = pool.install(|| {
            accumulators
                .par_iter_mut()
                .map(|acc| acc.flush(writer))
                .collect()
        });

        for outcome in outcomes {
            if let Some(outcome) = outcome? {
                summary.record(&outcome);
            }
        }

        debug!(cells = accumulators.len(), "Flushed accumulators");
        Ok(())
    }

    fn write_overview(
        &self,
        request: &RunRequest,
        previous: Option<&RunOverview>,
        summary: &RunSummary,
    ) -> Result<()> {
        let last_processed = summary.last.map(|t| t.date_naive()).unwrap_or(request.end);
        let first_processed = summary.first.map(|t| t.date_naive()).unwrap_or(request.start);

        let (first_day, last_day) = match previous {
            Some(prev) => (
                prev.first_day.min(first_processed),
                prev.last_day.max(last_processed),
            ),
            None => (first_processed, last_processed),
        };

        RunOverview {
            parameters: request.variables.clone(),
            overpass: request.overpass,
            rename: request.rename,
            step: request.step.num_seconds(),
            tile_size: self.config.tile_size,
            source: self
                .source_info
                .clone()
                .or_else(|| previous.and_then(|p| p.source.clone())),
            first_day,
            last_day,
            last_update: Utc::now(),
        }
        .write(&self.output)
    }
}

/// Reject a request whose parameters differ from the committed run.
fn check_overview(previous: &RunOverview, request: &RunRequest) -> Result<()> {
    let sorted = |names: &[String]| {
        let mut names = names.to_vec();
        names.sort();
        names
    };

    let mut differences = Vec::new();
    if sorted(&previous.parameters) != sorted(&request.variables) {
        differences.push(format!(
            "parameters {:?} != {:?}",
            request.variables, previous.parameters
        ));
    }
    if previous.overpass != request.overpass {
        differences.push(format!("overpass {} != {}", request.overpass, previous.overpass));
    }
    if previous.rename != request.rename {
        differences.push(format!("rename {} != {}", request.rename, previous.rename));
    }
    if previous.step != request.step.num_seconds() {
        differences.push(format!(
            "step {}s != {}s",
            request.step.num_seconds(),
            previous.step
        ));
    }

    if differences.is_empty() {
        Ok(())
    } else {
        Err(RepurposeError::InvalidConfig(format!(
            "request differs from the committed run: {}",
            differences.join(", ")
        )))
    }
}
