//! SMAP L3 time-series tool.
//!
//! Repurposes daily SMAP L3 soil moisture images into per-cell time-series
//! archives, extends existing archives with newly downloaded images, and reads
//! point time series back as CSV.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use smap_parser::Overpass;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "smap-l3")]
#[command(about = "Repurpose SMAP L3 soil moisture images into time series")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert images between two dates into cell time series
    Reshuffle(ReshuffleArgs),

    /// Extend existing time series with images newer than the last run
    Update {
        /// Root of the image folders
        input_root: PathBuf,

        /// Root of the time-series archives
        output_root: PathBuf,

        /// Run configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the time series of one point as CSV
    Read {
        /// Root of the time-series archives
        output_root: PathBuf,

        /// Grid point index
        #[arg(long, conflicts_with_all = ["lon", "lat"], required_unless_present_all = ["lon", "lat"])]
        gpi: Option<u64>,

        /// Longitude of the point (nearest grid point is used)
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Latitude of the point
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Maximum search distance in meters for coordinate lookups
        #[arg(long)]
        max_distance: Option<f64>,

        /// Load whole cell archives into memory
        #[arg(long)]
        bulk: bool,

        /// Variables to print (default: all)
        parameters: Vec<String>,
    },
}

#[derive(clap::Args, Debug)]
pub struct ReshuffleArgs {
    /// Root of the image folders
    input_root: PathBuf,

    /// Root of the time-series archives
    output_root: PathBuf,

    /// First day (YYYY-MM-DD)
    #[arg(value_parser = parse_date_arg)]
    start: NaiveDate,

    /// Last day (YYYY-MM-DD)
    #[arg(value_parser = parse_date_arg)]
    end: NaiveDate,

    /// Variables to convert, e.g. soil_moisture retrieval_qual_flag
    #[arg(required = true, num_args = 1..)]
    parameters: Vec<String>,

    /// Overpass to read: am, pm, both or none
    #[arg(long, default_value = "am", value_parser = parse_overpass_arg)]
    overpass: Overpass,

    /// Append _pm to PM variable names
    #[arg(long)]
    var_overpass_str: bool,

    /// Only use files with this Composite Release ID
    #[arg(long)]
    crid: Option<u32>,

    /// Spatial subset: min_lon min_lat max_lon max_lat
    #[arg(long, num_args = 4, value_names = ["MIN_LON", "MIN_LAT", "MAX_LON", "MAX_LAT"], allow_hyphen_values = true)]
    bbox: Option<Vec<f64>>,

    /// Only use these grid points: a gpi list or a netCDF land mask
    #[arg(long, value_name = "FILE")]
    land_points: Option<PathBuf>,

    /// Product grid: ease36 or ease9
    #[arg(long, default_value = "ease36")]
    grid: String,

    /// Images accumulated before archives are written
    #[arg(long)]
    image_buffer: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Stop when a day has no image instead of skipping it
    #[arg(long)]
    abort_on_missing: bool,

    /// Run configuration file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    smap_common::time::parse_date(s).map_err(|e| e.to_string())
}

fn parse_overpass_arg(s: &str) -> Result<Overpass, String> {
    Overpass::from_str(s).ok_or_else(|| format!("unknown overpass '{}', expected am, pm, both or none", s))
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log_level, cli.log_json) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(2);
    }

    smap_parser::silence_hdf5_errors();

    let result: Result<()> = match cli.command {
        Commands::Reshuffle(args) => commands::reshuffle(args),
        Commands::Update {
            input_root,
            output_root,
            config,
        } => commands::update(&input_root, &output_root, config.as_deref()),
        Commands::Read {
            output_root,
            gpi,
            lon,
            lat,
            max_distance,
            bulk,
            parameters,
        } => commands::read(&output_root, gpi, lon.zip(lat), max_distance, bulk, &parameters),
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
