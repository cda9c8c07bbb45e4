//! Subcommand implementations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use cell_store::{PointQuery, ReaderConfig, TimeSeries, TimeSeriesReader};
use repurpose::{
    MissingImagePolicy, RepurposeConfig, Repurposer, RunOverview, RunRequest, RunSummary,
    SourceInfo,
};
use smap_common::{BoundingBox, Ease2Resolution, Grid};
use smap_parser::{FileLocator, PointMask, SmapImageReader, SPL3SMP_E_PREFIX, SPL3SMP_PREFIX};
use tracing::info;

use crate::ReshuffleArgs;

/// Run configuration from a YAML file or the environment.
fn load_config(path: Option<&Path>) -> Result<RepurposeConfig> {
    match path {
        Some(path) => RepurposeConfig::from_yaml(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(RepurposeConfig::from_env()),
    }
}

/// Image reader for the recorded source description.
fn image_reader(input_root: &Path, source: &SourceInfo) -> Result<SmapImageReader> {
    let resolution = Ease2Resolution::from_str(&source.grid)?;
    let mut grid = Grid::ease2_global(resolution)?;
    if let Some(path) = &source.land_points {
        grid = PointMask::load(path)?.apply(&grid)?;
    }
    if let Some(bbox) = source.bbox {
        let bbox = BoundingBox::from_slice(&bbox)?;
        grid = grid.subset_bbox(&bbox)?;
    }

    let default_prefix = match resolution {
        Ease2Resolution::Km36 => SPL3SMP_PREFIX,
        Ease2Resolution::Km9 => SPL3SMP_E_PREFIX,
    };
    let locator = FileLocator::new(input_root)
        .with_prefix(source.prefix.as_deref().unwrap_or(default_prefix))
        .with_crid(source.crid);

    info!(
        grid = %resolution,
        points = grid.len(),
        crid = ?source.crid,
        root = %input_root.display(),
        "Opened image source"
    );

    Ok(SmapImageReader::new(locator, grid)?)
}

fn report(summary: &RunSummary) {
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        dropped = summary.dropped,
        cells = summary.cells,
        points = summary.points,
        first = ?summary.first,
        last = ?summary.last,
        "Run finished"
    );
}

pub fn reshuffle(args: ReshuffleArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.image_buffer {
        config.image_buffer = n;
    }
    if let Some(n) = args.workers {
        config.workers = n;
    }
    if args.abort_on_missing {
        config.missing_images = MissingImagePolicy::Abort;
    }

    let source = SourceInfo {
        grid: Ease2Resolution::from_str(&args.grid)?.as_str().to_string(),
        bbox: args
            .bbox
            .as_deref()
            .map(|b| [b[0], b[1], b[2], b[3]]),
        crid: args.crid,
        prefix: None,
        land_points: args
            .land_points
            .as_deref()
            .map(|path| {
                std::fs::canonicalize(path)
                    .with_context(|| format!("locating land points {}", path.display()))
            })
            .transpose()?,
    };
    let reader = image_reader(&args.input_root, &source)?;

    let request = RunRequest::new(args.start, args.end, args.parameters)
        .with_overpass(args.overpass)
        .with_rename(args.var_overpass_str);

    let summary = Repurposer::new(reader, &args.output_root, config)?
        .with_source_info(source)
        .run(&request)?;
    report(&summary);
    Ok(())
}

pub fn update(input_root: &Path, output_root: &Path, config: Option<&Path>) -> Result<()> {
    let overview = RunOverview::load(output_root)?;
    let Some(source) = overview.source.clone() else {
        bail!(
            "{} does not record its image source; run reshuffle instead",
            output_root.display()
        );
    };

    let mut config = load_config(config)?;
    // archives keep the tiling they were created with
    config.tile_size = overview.tile_size;

    let reader = image_reader(input_root, &source)?;
    match Repurposer::new(reader, output_root, config)?.extend()? {
        Some(summary) => report(&summary),
        None => info!(last_day = %overview.last_day, "No new images"),
    }
    Ok(())
}

pub fn read(
    output_root: &Path,
    gpi: Option<u64>,
    lonlat: Option<(f64, f64)>,
    max_distance: Option<f64>,
    bulk: bool,
    parameters: &[String],
) -> Result<()> {
    let query = match (gpi, lonlat) {
        (Some(gpi), _) => PointQuery::Gpi(gpi),
        (None, Some((lon, lat))) => PointQuery::LonLat { lon, lat },
        (None, None) => bail!("either --gpi or --lon/--lat is required"),
    };

    let config = ReaderConfig {
        bulk,
        max_distance_m: max_distance,
        ..Default::default()
    };
    let reader = TimeSeriesReader::open(output_root, config)?;
    let series = reader.read(query, parameters)?;

    info!(
        gpi = series.gpi,
        lon = series.lon,
        lat = series.lat,
        cell = series.cell,
        len = series.len(),
        "Read time series"
    );

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    write_csv(&mut writer, &series)?;
    writer.flush()?;
    Ok(())
}

/// One row per timestamp; missing values are empty fields.
fn write_csv<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    series: &TimeSeries,
) -> csv::Result<()> {
    let mut header = vec!["time".to_string()];
    header.extend(series.columns.keys().cloned());
    writer.write_record(&header)?;

    for (i, time) in series.index.iter().enumerate() {
        let mut record = vec![time.to_rfc3339()];
        record.extend(
            series
                .columns
                .keys()
                .map(|name| series.value(name, i).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    Ok(())
}
