//! End-to-end repurposing tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cell_store::{archive_path, GridManifest, ReaderConfig, TimeSeriesReader};
use chrono::{Duration, NaiveDate};
use repurpose::{
    MissingImagePolicy, RepurposeConfig, RepurposeError, Repurposer, RunOverview, RunRequest,
    SourceInfo,
};
use smap_common::time::day_start;
use smap_parser::{
    FileLocator, MemoryContainer, MemoryImageSource, Overpass, ReadError, SmapImageReader,
};
use test_utils::{
    assert_approx_eq, assert_series_eq, four_point_grid, raster_grid, soil_moisture_field,
    soil_moisture_value, SmapArchiveFixture, SmapFileBuilder, AM_GROUP, PM_GROUP,
};
use walkdir::WalkDir;

const CELL: u32 = 18 * 72 + 36;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 4, d).unwrap()
}

fn container(values: [f64; 4]) -> MemoryContainer {
    MemoryContainer::new().with_variable(
        AM_GROUP,
        "soil_moisture",
        vec![4],
        values.to_vec(),
        BTreeMap::new(),
    )
}

/// Four point source with one image per given day.
fn source(days: &[(u32, [f64; 4])]) -> MemoryImageSource {
    let mut source = MemoryImageSource::new(four_point_grid()).unwrap();
    for (day, values) in days {
        source.insert(day_start(date(*day)), container(*values));
    }
    source
}

fn two_days() -> MemoryImageSource {
    source(&[(1, [0.1, 0.2, 0.3, 0.4]), (2, [0.15, 0.25, 0.35, 0.45])])
}

/// Four point source whose images also carry a brightness temperature.
fn source_with_tb(days: &[(u32, [f64; 4])]) -> MemoryImageSource {
    let mut source = MemoryImageSource::new(four_point_grid()).unwrap();
    for (day, values) in days {
        let tb = values.iter().map(|v| 200.0 + v * 100.0).collect();
        source.insert(
            day_start(date(*day)),
            container(*values).with_variable(AM_GROUP, "tb", vec![4], tb, BTreeMap::new()),
        );
    }
    source
}

const THREE_DAYS: [(u32, [f64; 4]); 3] = [
    (1, [0.1, 0.2, 0.3, 0.4]),
    (2, [0.15, 0.25, 0.35, 0.45]),
    (3, [0.13, 0.23, 0.33, 0.43]),
];

fn config(workers: usize) -> RepurposeConfig {
    RepurposeConfig {
        workers,
        ..Default::default()
    }
}

fn sm() -> Vec<String> {
    vec!["soil_moisture".to_string()]
}

/// Relative path → contents of every file except the run overview.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file() && e.file_name() != "overview.yml")
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

// ============================================================================
// Basic runs
// ============================================================================

#[test]
fn test_four_point_two_days() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("ts");

    let repurposer = Repurposer::new(two_days(), &out, config(2)).unwrap();
    let summary = repurposer
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.cells, 1);
    assert_eq!(summary.points, 4);
    assert_eq!(summary.created, 1);
    assert!(archive_path(&out, CELL).is_dir());
    assert!(GridManifest::exists(&out));

    let reader = TimeSeriesReader::open(&out, ReaderConfig::default()).unwrap();
    let ts = reader.read_gpi(3, &sm()).unwrap();
    assert_eq!(ts.cell, CELL);
    assert_eq!(ts.index, vec![day_start(date(1)), day_start(date(2))]);
    assert_series_eq!(ts.column("soil_moisture").unwrap(), [0.3, 0.35]);

    let ts = reader.read_lonlat(3.9, 4.1, &sm()).unwrap();
    assert_eq!(ts.gpi, 4);
    assert_series_eq!(ts.column("soil_moisture").unwrap(), [0.4, 0.45]);
}

#[test]
fn test_overview_written() {
    let tmp = tempfile::tempdir().unwrap();
    let info = SourceInfo {
        grid: "ease36".to_string(),
        crid: Some(13080),
        ..Default::default()
    };

    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .with_source_info(info.clone())
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();

    let overview = RunOverview::load(tmp.path()).unwrap();
    assert_eq!(overview.parameters, sm());
    assert_eq!(overview.overpass, Overpass::Am);
    assert_eq!(overview.first_day, date(1));
    assert_eq!(overview.last_day, date(2));
    assert_eq!(overview.step, 86_400);
    assert_eq!(overview.source, Some(info));
}

#[test]
fn test_missing_day_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let source = source(&[(1, [0.1, 0.2, 0.3, 0.4]), (3, [0.11, 0.21, 0.31, 0.41])]);

    let summary = Repurposer::new(source, tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(3), ["soil_moisture"]))
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 1);

    let reader = TimeSeriesReader::open(tmp.path(), ReaderConfig::default()).unwrap();
    let ts = reader.read_gpi(1, &sm()).unwrap();
    assert_eq!(ts.index, vec![day_start(date(1)), day_start(date(3))]);
    assert_series_eq!(ts.column("soil_moisture").unwrap(), [0.1, 0.11]);
}

#[test]
fn test_leading_missing_days_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let source = source(&[(3, [0.1, 0.2, 0.3, 0.4])]);

    let summary = Repurposer::new(source, tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(3), ["soil_moisture"]))
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.first, Some(day_start(date(3))));
    assert_eq!(RunOverview::load(tmp.path()).unwrap().first_day, date(3));
}

#[test]
fn test_small_image_buffer_same_series() {
    let tmp = tempfile::tempdir().unwrap();
    let days = [
        (1, [0.1, 0.2, 0.3, 0.4]),
        (2, [0.15, 0.25, 0.35, 0.45]),
        (3, [0.12, 0.22, 0.32, 0.42]),
    ];
    let cfg = RepurposeConfig {
        image_buffer: 1,
        ..config(2)
    };

    Repurposer::new(source(&days), tmp.path(), cfg)
        .unwrap()
        .run(&RunRequest::new(date(1), date(3), ["soil_moisture"]))
        .unwrap();

    let reader = TimeSeriesReader::open(tmp.path(), ReaderConfig::default()).unwrap();
    let ts = reader.read_gpi(2, &sm()).unwrap();
    assert_series_eq!(ts.column("soil_moisture").unwrap(), [0.2, 0.25, 0.22]);
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_unknown_variable_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("ts");

    let err = Repurposer::new(two_days(), &out, config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["not_a_variable"]))
        .unwrap_err();

    assert!(matches!(
        err,
        RepurposeError::Read(ReadError::UnknownVariable { .. })
    ));
    assert!(!archive_path(&out, CELL).exists());
    assert!(!GridManifest::exists(&out));
}

#[test]
fn test_no_images_in_range() {
    let tmp = tempfile::tempdir().unwrap();
    let err = Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(10), date(12), ["soil_moisture"]))
        .unwrap_err();
    assert!(matches!(err, RepurposeError::NoImagesFound { .. }));
}

#[test]
fn test_abort_on_missing_leaves_no_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let source = source(&[(1, [0.1, 0.2, 0.3, 0.4]), (3, [0.11, 0.21, 0.31, 0.41])]);
    let cfg = RepurposeConfig {
        missing_images: MissingImagePolicy::Abort,
        ..config(1)
    };

    let err = Repurposer::new(source, tmp.path(), cfg)
        .unwrap()
        .run(&RunRequest::new(date(1), date(3), ["soil_moisture"]))
        .unwrap_err();
    assert!(matches!(err, RepurposeError::Read(ReadError::MissingImage { .. })));
    assert!(!GridManifest::exists(tmp.path()));
}

#[test]
fn test_fresh_run_removes_stale_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let stale = archive_path(tmp.path(), 1);
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("zarr.json"), "{}").unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "keep").unwrap();

    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();

    assert!(!stale.exists());
    assert!(tmp.path().join("notes.txt").exists());
    assert!(archive_path(tmp.path(), CELL).is_dir());
}

#[test]
fn test_existing_output_of_other_tiling_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let request = RunRequest::new(date(1), date(2), ["soil_moisture"]);
    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&request)
        .unwrap();

    let cfg = RepurposeConfig {
        tile_size: 10.0,
        ..config(1)
    };
    let err = Repurposer::new(two_days(), tmp.path(), cfg)
        .unwrap()
        .run(&request)
        .unwrap_err();
    assert!(matches!(err, RepurposeError::InvalidConfig(_)));
    // the committed run is untouched
    assert!(GridManifest::exists(tmp.path()));
}

#[test]
fn test_other_variables_over_committed_run_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();
    let committed = snapshot(tmp.path());

    let err = Repurposer::new(source_with_tb(&THREE_DAYS), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(3), date(3), ["soil_moisture", "tb"]))
        .unwrap_err();
    assert!(matches!(err, RepurposeError::InvalidConfig(_)));
    assert!(GridManifest::exists(tmp.path()));
    assert_eq!(snapshot(tmp.path()), committed);

    // a matching run still extends the archives
    Repurposer::new(source_with_tb(&THREE_DAYS), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(3), date(3), ["soil_moisture"]))
        .unwrap();
    let reader = TimeSeriesReader::open(tmp.path(), ReaderConfig::default()).unwrap();
    let ts = reader.read_gpi(3, &sm()).unwrap();
    assert_eq!(ts.len(), 3);
    assert_series_eq!(ts.column("soil_moisture").unwrap(), [0.3, 0.35, 0.33]);
}

#[test]
fn test_other_rename_or_step_over_committed_run_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();

    let requests = [
        RunRequest::new(date(3), date(3), ["soil_moisture"]).with_rename(true),
        RunRequest::new(date(3), date(3), ["soil_moisture"]).with_step(Duration::hours(12)),
    ];
    for request in &requests {
        let err = Repurposer::new(source(&THREE_DAYS), tmp.path(), config(1))
            .unwrap()
            .run(request)
            .unwrap_err();
        assert!(matches!(err, RepurposeError::InvalidConfig(_)));
        assert!(GridManifest::exists(tmp.path()));
    }
}

#[test]
fn test_failed_read_over_committed_run_keeps_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();
    let committed = snapshot(tmp.path());

    let err = Repurposer::new(source(&THREE_DAYS), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(3), date(3), ["not_a_variable"]))
        .unwrap_err();
    assert!(matches!(
        err,
        RepurposeError::Read(ReadError::UnknownVariable { .. })
    ));
    assert!(GridManifest::exists(tmp.path()));
    assert_eq!(snapshot(tmp.path()), committed);
}

#[test]
fn test_invalid_config_rejected() {
    let cfg = RepurposeConfig {
        image_buffer: 0,
        ..Default::default()
    };
    assert!(matches!(
        Repurposer::new(two_days(), "/tmp/unused", cfg),
        Err(RepurposeError::InvalidConfig(_))
    ));
}

// ============================================================================
// Determinism and extension
// ============================================================================

#[test]
fn test_rerun_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let request = RunRequest::new(date(1), date(2), ["soil_moisture"]);

    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&request)
        .unwrap();
    let first = snapshot(tmp.path());

    let summary = Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&request)
        .unwrap();
    assert_eq!(summary.dropped, 2);
    assert_eq!(snapshot(tmp.path()), first);
}

#[test]
fn test_output_independent_of_worker_count() {
    let tmp = tempfile::tempdir().unwrap();
    let (a, b) = (tmp.path().join("a"), tmp.path().join("b"));
    let grid = raster_grid(4, 6, 10.0, 51.0, 0.5);

    let fill = |source: &mut MemoryImageSource| {
        for day in 1..=3u32 {
            let values = soil_moisture_field(4, 6, day as usize)
                .into_iter()
                .map(f64::from)
                .collect();
            source.insert(
                day_start(date(day)),
                MemoryContainer::new().with_variable(
                    AM_GROUP,
                    "soil_moisture",
                    vec![4, 6],
                    values,
                    BTreeMap::new(),
                ),
            );
        }
    };

    let request = RunRequest::new(date(1), date(3), ["soil_moisture"]);
    for (out, workers) in [(&a, 1), (&b, 4)] {
        let mut source = MemoryImageSource::new(grid.clone()).unwrap();
        fill(&mut source);
        let summary = Repurposer::new(source, out, config(workers))
            .unwrap()
            .run(&request)
            .unwrap();
        assert_eq!(summary.cells, 2);
    }

    assert_eq!(snapshot(&a), snapshot(&b));
}

#[test]
fn test_extend_appends_later_days() {
    let tmp = tempfile::tempdir().unwrap();
    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();

    let extended = source(&[
        (1, [0.1, 0.2, 0.3, 0.4]),
        (2, [0.15, 0.25, 0.35, 0.45]),
        (3, [0.13, 0.23, 0.33, 0.43]),
    ]);
    let repurposer = Repurposer::new(extended, tmp.path(), config(1)).unwrap();
    let summary = repurposer.extend().unwrap().unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.first, Some(day_start(date(3))));

    let overview = RunOverview::load(tmp.path()).unwrap();
    assert_eq!(overview.first_day, date(1));
    assert_eq!(overview.last_day, date(3));

    let reader = TimeSeriesReader::open(tmp.path(), ReaderConfig::default()).unwrap();
    let ts = reader.read_gpi(3, &sm()).unwrap();
    assert_eq!(ts.len(), 3);
    assert_series_eq!(ts.column("soil_moisture").unwrap(), [0.3, 0.35, 0.33]);

    // nothing newer available
    assert!(repurposer.extend().unwrap().is_none());
}

#[test]
fn test_extend_with_stale_overview_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]))
        .unwrap();

    // recorded parameters no longer describe the archives
    let mut overview = RunOverview::load(tmp.path()).unwrap();
    overview.parameters = vec!["soil_moisture".to_string(), "tb".to_string()];
    overview.write(tmp.path()).unwrap();

    let err = Repurposer::new(source_with_tb(&THREE_DAYS), tmp.path(), config(1))
        .unwrap()
        .extend()
        .unwrap_err();
    assert!(matches!(err, RepurposeError::InvalidConfig(_)));
    assert!(GridManifest::exists(tmp.path()));

    let reader = TimeSeriesReader::open(tmp.path(), ReaderConfig::default()).unwrap();
    let ts = reader.read_gpi(3, &sm()).unwrap();
    assert_eq!(ts.index, vec![day_start(date(1)), day_start(date(2))]);
}

#[test]
fn test_extend_requires_committed_run() {
    let tmp = tempfile::tempdir().unwrap();
    let err = Repurposer::new(two_days(), tmp.path(), config(1))
        .unwrap()
        .extend()
        .unwrap_err();
    assert!(matches!(err, RepurposeError::Overview(_)));
}

// ============================================================================
// From files
// ============================================================================

#[test]
fn test_both_overpasses_from_files() {
    let tmp = tempfile::tempdir().unwrap();
    let (input, out) = (tmp.path().join("img"), tmp.path().join("ts"));
    let fixture = SmapArchiveFixture::new(&input);

    for day in 1..=2u32 {
        let am = soil_moisture_field(4, 6, day as usize);
        let pm: Vec<f32> = am.iter().map(|v| v + 0.01).collect();
        fixture.write_day(
            date(day),
            &SmapFileBuilder::new(4, 6)
                .group(AM_GROUP, &[("soil_moisture", am)])
                .group(PM_GROUP, &[("soil_moisture_pm", pm)]),
        );
    }

    let grid = raster_grid(4, 6, 10.0, 51.0, 0.5);
    let reader = SmapImageReader::new(FileLocator::new(&input), grid).unwrap();
    let summary = Repurposer::new(reader, &out, config(2))
        .unwrap()
        .run(&RunRequest::new(date(1), date(2), ["soil_moisture"]).with_overpass(Overpass::Both))
        .unwrap();
    assert_eq!(summary.variables, vec!["soil_moisture_am", "soil_moisture_pm"]);

    let reader = TimeSeriesReader::open(&out, ReaderConfig::default()).unwrap();
    // gpi 0 is the bottom-left raster cell: file row 3, column 0
    let ts = reader.read_gpi(0, &[]).unwrap();
    let am = ts.column("soil_moisture_am").unwrap();
    let pm = ts.column("soil_moisture_pm").unwrap();
    for day in 1..=2usize {
        let expected = soil_moisture_value(3, 0, day);
        assert_approx_eq!(am[day - 1], expected, 1e-6);
        assert_approx_eq!(pm[day - 1], expected + 0.01, 1e-6);
    }
}
