//! Command-Line Interface Module
//!
//! Handles argument parsing and validation for the chromasky application.

use std::path::PathBuf;

use chrono::NaiveTime;
use clap::{Parser, Subcommand};

use chromasky::grid::Density;
use chromasky::pipeline::PipelineConfig;
use chromasky::region::EventType;
use chromasky::score::{CanvasCurve, ScoringConfig};
use chromasky::time::parse_local_time;

// ===================== CLI =====================

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Log level specification, e.g. "info" or "chromasky=debug" (RUST_LOG wins)
    #[arg(long, global = true, default_value = "info", env = "CHROMASKY_LOG_LEVEL")]
    pub log_level: String,
    /// Write rotating log files to this directory instead of stderr
    #[arg(long, global = true, env = "CHROMASKY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sunrise, sunset and civil twilight times for one location
    SunEvents(SunEventsArgs),
    /// GeoJSON polygon of where an event happens within a local time window
    Region(RegionArgs),
    /// Score the event region against forecast datasets
    Score(ScoreArgs),
}

#[derive(clap::Args, Debug)]
pub struct SunEventsArgs {
    /// Observer latitude in decimal degrees (-90 to 90)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude, env = "CHROMASKY_LATITUDE")]
    pub latitude: f64,
    /// Observer longitude in decimal degrees (-180 to 180)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude, env = "CHROMASKY_LONGITUDE")]
    pub longitude: f64,
    /// Time zone to use ("system", "location", "UTC" or IANA time zone name)
    #[arg(long, default_value = "location", env = "CHROMASKY_TIMEZONE")]
    pub timezone: String,
    /// Date for calculations (e.g., "2025-06-21" or "tomorrow"); defaults to today
    #[arg(long, env = "CHROMASKY_DATE")]
    pub date: Option<String>,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Event and time window shared by `region` and `score`.
#[derive(clap::Args, Debug, Clone)]
pub struct WindowArgs {
    /// Solar event: sunrise, sunset, first_light or last_light
    #[arg(long, default_value = "sunset", value_parser = parse_event, env = "CHROMASKY_EVENT")]
    pub event: EventType,
    /// Date (e.g., "2025-06-21" or "tomorrow"); defaults to today in the time zone
    #[arg(long, env = "CHROMASKY_DATE")]
    pub date: Option<String>,
    /// Local center time(s) HH:MM[:SS]; several give the union of their windows
    #[arg(long = "center", default_value = "18:00", value_delimiter = ',', value_parser = parse_center,
          env = "CHROMASKY_CENTER_TIMES")]
    pub centers: Vec<NaiveTime>,
    /// Window length in minutes, centered on each center time
    #[arg(long, default_value_t = 60, value_parser = parse_window, env = "CHROMASKY_WINDOW_MINUTES")]
    pub window_minutes: u32,
    /// Time zone of the center times ("system", "UTC" or IANA time zone name)
    #[arg(long, default_value = "Asia/Shanghai", env = "CHROMASKY_TIMEZONE")]
    pub timezone: String,
    /// Latitude band "MIN:MAX" (e.g., "15:55")
    #[arg(long, default_value = "15:55", allow_hyphen_values = true, value_parser = parse_lat_range,
          env = "CHROMASKY_LAT_RANGE")]
    pub lat_range: (f64, f64),
}

#[derive(clap::Args, Debug)]
pub struct RegionArgs {
    #[command(flatten)]
    pub window: WindowArgs,
    /// Write the GeoJSON here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    /// Forecast dataset file(s) in JSON format
    #[arg(long = "data", required = true, num_args = 1.., env = "CHROMASKY_DATA", value_delimiter = ',')]
    pub data: Vec<PathBuf>,
    /// Dataset event id(s) to score; several keep each point's best score.
    /// Defaults to every loaded dataset
    #[arg(long = "event-id", value_delimiter = ',', env = "CHROMASKY_EVENT_ID")]
    pub event_ids: Vec<String>,
    /// Grid density: coarse, medium or fine
    #[arg(long, default_value = "medium", value_parser = parse_density, env = "CHROMASKY_DENSITY")]
    pub density: Density,
    /// Write the GeoJSON here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    // ===================== SCORING OPTIONS =====================
    /// Combined high + medium cloud (%) at which the canvas factor saturates
    #[arg(long, default_value_t = 20.0, value_parser = parse_percent, env = "CHROMASKY_CANVAS_THRESHOLD")]
    pub canvas_threshold: f64,
    /// Canvas factor below the threshold: constant ("step") or linear ("ramp")
    #[arg(long, default_value = "step", value_parser = ["step", "ramp"], env = "CHROMASKY_CANVAS_CURVE")]
    pub canvas_curve: String,
    /// Canvas factor at zero cover (step value or ramp start, 0.0-1.0)
    #[arg(long, default_value_t = 0.1, value_parser = parse_unit_interval, env = "CHROMASKY_CANVAS_BASE")]
    pub canvas_base: f64,
    /// Exponent applied to light-path clarity
    #[arg(long, default_value_t = 2.0, value_parser = parse_exponent, env = "CHROMASKY_LIGHT_PATH_EXPONENT")]
    pub light_path_exponent: f64,
    /// Total-cloud samples along the sun azimuth
    #[arg(long, default_value_t = 5, value_parser = parse_count, env = "CHROMASKY_PATH_SAMPLES")]
    pub path_samples: usize,
    /// Distance of the farthest light-path sample in km
    #[arg(long, default_value_t = 400.0, value_parser = parse_positive_f64, env = "CHROMASKY_PATH_SCAN_KM")]
    pub path_scan_km: f64,
    /// Ignore aerosol data (air-quality factor fixed at 1.0)
    #[arg(long, env = "CHROMASKY_NO_AOD")]
    pub no_aod: bool,

    // ===================== PIPELINE OPTIONS =====================
    /// Worker threads; defaults to the available parallelism
    #[arg(long, value_parser = parse_count, env = "CHROMASKY_WORKERS")]
    pub workers: Option<usize>,
    /// Smallest chunk of points per task
    #[arg(long, default_value_t = 100, value_parser = parse_count, env = "CHROMASKY_MIN_CHUNK")]
    pub min_chunk: usize,
    /// Largest chunk of points per task
    #[arg(long, default_value_t = 500, value_parser = parse_count, env = "CHROMASKY_MAX_CHUNK")]
    pub max_chunk: usize,
}

impl ScoreArgs {
    pub fn scoring_config(&self) -> ScoringConfig {
        let canvas_curve = match self.canvas_curve.as_str() {
            "ramp" => CanvasCurve::Ramp { base: self.canvas_base },
            _ => CanvasCurve::Step { low: self.canvas_base },
        };
        ScoringConfig {
            canvas_threshold: self.canvas_threshold,
            canvas_curve,
            light_path_exponent: self.light_path_exponent,
            path_samples: self.path_samples,
            path_scan_km: self.path_scan_km,
            use_aod: !self.no_aod,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            workers: self.workers.unwrap_or(defaults.workers),
            min_chunk: self.min_chunk.min(self.max_chunk),
            max_chunk: self.max_chunk,
        }
    }
}

// ===================== CLI VALUE PARSERS =====================

fn parse_latitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-90.0..=90.0).contains(&v) {
        return Err(format!("Latitude must be between -90 and 90, got {}", v));
    }
    Ok(v)
}

fn parse_longitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-180.0..=180.0).contains(&v) {
        return Err(format!("Longitude must be between -180 and 180, got {}", v));
    }
    Ok(v)
}

fn parse_positive_f64(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(v > 0.0 && v.is_finite()) {
        return Err(format!("Value must be positive, got {}", v));
    }
    Ok(v)
}

fn parse_percent(s: &str) -> Result<f64, String> {
    let v = parse_positive_f64(s)?;
    if v > 100.0 {
        return Err(format!("Percentage must be between 0 and 100, got {}", v));
    }
    Ok(v)
}

fn parse_unit_interval(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("Value must be between 0.0 and 1.0, got {}", v));
    }
    Ok(v)
}

fn parse_exponent(s: &str) -> Result<f64, String> {
    let v = parse_positive_f64(s)?;
    if v > 5.0 {
        return Err(format!("Exponent must be in (0, 5], got {}", v));
    }
    Ok(v)
}

fn parse_count(s: &str) -> Result<usize, String> {
    let v: usize = s.parse().map_err(|_| format!("Invalid integer: {}", s))?;
    if v == 0 {
        return Err("Value must be at least 1".to_string());
    }
    Ok(v)
}

fn parse_window(s: &str) -> Result<u32, String> {
    let v: u32 = s.parse().map_err(|_| format!("Invalid integer: {}", s))?;
    if !(1..=720).contains(&v) {
        return Err(format!("Window must be between 1 and 720 minutes, got {}", v));
    }
    Ok(v)
}

fn parse_event(s: &str) -> Result<EventType, String> {
    s.parse().map_err(|e: chromasky::ChromaError| e.to_string())
}

fn parse_density(s: &str) -> Result<Density, String> {
    s.parse()
}

fn parse_center(s: &str) -> Result<NaiveTime, String> {
    parse_local_time(s.trim()).map_err(|e| e.to_string())
}

/// "MIN:MAX" latitude band; a colon keeps negative bounds unambiguous.
fn parse_lat_range(s: &str) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("Range must be in format MIN:MAX (e.g., '15:55'), got '{}'", s))?;
    let min = parse_latitude(a.trim())?;
    let max = parse_latitude(b.trim())?;
    if min > max {
        return Err(format!("Minimum ({}) cannot be greater than maximum ({})", min, max));
    }
    Ok((min, max))
}
