use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use clap::Parser;
use log::{info, warn};

mod cli;
mod output;

use chromasky::ChromaError;
use chromasky::dataset::{DatasetRegistry, GridDataset, MeteoDataset};
use chromasky::filter::filter_inside;
use chromasky::geojson::{ScoredMetadata, assemble, region_document};
use chromasky::grid::sample_grid;
use chromasky::logging::setup_logging;
use chromasky::pipeline::ScoringPipeline;
use chromasky::region::EventRegion;
use chromasky::solar::sun_events;
use chromasky::time::{parse_date, parse_timezone};
use cli::{Args, Command, RegionArgs, ScoreArgs, SunEventsArgs, WindowArgs};
use output::{Location, SunEventsResponse, print_sun_events, write_json};

// ===================== MAIN =====================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let _logger = setup_logging(&args.log_level, args.log_dir.as_deref())?;

    match &args.command {
        Command::SunEvents(a) => run_sun_events(a),
        Command::Region(a) => run_region(a),
        Command::Score(a) => run_score(a),
    }
}

// ===================== SHARED HELPERS =====================

/// Requested date, or `fallback`, or today in `tz`.
fn resolve_date(arg: Option<&str>, tz: Tz, fallback: Option<NaiveDate>) -> chromasky::Result<NaiveDate> {
    // Anchor 'today' to the target timezone
    let anchor = Utc::now().with_timezone(&tz);
    match (arg, fallback) {
        (Some(s), _) => parse_date(s, anchor),
        (None, Some(date)) => Ok(date),
        (None, None) => Ok(anchor.date_naive()),
    }
}

fn window_timezone(w: &WindowArgs) -> chromasky::Result<Tz> {
    // Event windows span many longitudes, so there is no single "location" zone
    if w.timezone == "location" {
        return Err(ChromaError::InvalidTimeOrTimezone(
            "'location' is not valid for event windows; use an IANA name, 'system' or 'UTC'".into(),
        ));
    }
    parse_timezone(&w.timezone, 0.0, 0.0)
}

fn build_region(w: &WindowArgs, tz: Tz, date: NaiveDate) -> chromasky::Result<EventRegion> {
    EventRegion::for_center_times(w.event, date, &w.centers, w.window_minutes, tz, w.lat_range)
}

// ===================== SUBCOMMANDS =====================

fn run_sun_events(a: &SunEventsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tz = parse_timezone(&a.timezone, a.latitude, a.longitude)?;
    let date = resolve_date(a.date.as_deref(), tz, None)?;
    let events = sun_events(a.latitude, a.longitude, date, tz);

    if a.json {
        let response = SunEventsResponse {
            location: Location { latitude: a.latitude, longitude: a.longitude },
            date,
            timezone: tz.name().to_string(),
            events,
        };
        write_json(&response, None)
    } else {
        print_sun_events(a.latitude, a.longitude, date, tz, &events);
        Ok(())
    }
}

fn run_region(a: &RegionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tz = window_timezone(&a.window)?;
    let date = resolve_date(a.window.date.as_deref(), tz, None)?;
    let region = build_region(&a.window, tz, date)?;
    write_json(&region_document(&region, date, tz), a.output.as_deref())
}

fn run_score(a: &ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Load every dataset once; workers share the handles
    let mut registry = DatasetRegistry::new();
    let mut axes: Vec<(String, Vec<f64>, Vec<f64>)> = Vec::with_capacity(a.data.len());
    for path in &a.data {
        let dataset = GridDataset::load(path)?;
        let id = dataset.event_id().to_string();
        if registry.get(&id).is_some() {
            warn!("Dataset {} replaces an earlier one for event '{}'", path.display(), id);
            axes.retain(|(other, ..)| *other != id);
        }
        axes.push((id, dataset.latitudes().to_vec(), dataset.longitudes().to_vec()));
        registry.insert(Arc::new(dataset));
    }

    let event_ids: Vec<String> = if a.event_ids.is_empty() {
        axes.iter().map(|(id, ..)| id.clone()).collect()
    } else {
        a.event_ids.clone()
    };
    let mut metas = Vec::with_capacity(event_ids.len());
    for id in &event_ids {
        match registry.get(id) {
            Some(ds) => metas.push(*ds.time_meta()),
            None => return Err(format!("no dataset loaded for event id '{}'", id).into()),
        }
    }
    let (Some(first_id), Some(first_meta)) = (event_ids.first(), metas.first()) else {
        return Err("no event to score".into());
    };
    // Candidate points come from the first event's grid
    let Some((_, lats, lons)) = axes.iter().find(|(id, ..)| id == first_id) else {
        return Err(format!("no dataset loaded for event id '{}'", first_id).into());
    };

    // Without --date, the region follows the first event's forecast day
    let tz = window_timezone(&a.window)?;
    let date = resolve_date(a.window.date.as_deref(), tz, Some(first_meta.forecast_date(tz)))?;
    let region = build_region(&a.window, tz, date)?;
    for (id, meta) in event_ids.iter().zip(&metas) {
        if !region.covers_instant(meta.forecast_time_utc) {
            warn!(
                "Forecast time {} of '{}' falls outside every '{}' window on {}; check --date and --center",
                meta.forecast_time_utc.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"),
                id,
                region.event,
                date
            );
        }
    }

    let candidates = sample_grid(lats, lons, a.window.lat_range, a.density);
    let inside = filter_inside(&candidates, &region);
    info!(
        "{} of {} {} grid points fall inside the '{}' region",
        inside.len(),
        candidates.len(),
        a.density,
        region.event
    );

    let pipeline = ScoringPipeline::new(Arc::new(registry), a.scoring_config(), a.pipeline_config());
    let report = match event_ids.as_slice() {
        [only] => pipeline.run(only, &inside)?,
        many => pipeline.run_batch(many, &inside)?,
    };

    let metadata = ScoredMetadata {
        event_name: event_ids.join(","),
        density: a.density,
        window_minutes: a.window.window_minutes,
        latitude_range: [a.window.lat_range.0, a.window.lat_range.1],
    };
    write_json(&assemble(&report.scored, metadata), a.output.as_deref())
}
