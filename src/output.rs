//! Output Formatting Module
//!
//! Terminal and JSON rendering for sun events, and document writing for the
//! GeoJSON subcommands.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;

use chromasky::solar::{EventTime, SunEvents};
use chromasky::time::format_hms;

// ===================== SUN EVENTS =====================

#[derive(Debug, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// JSON shape of the `sun-events` subcommand.
#[derive(Debug, Serialize)]
pub struct SunEventsResponse {
    pub location: Location,
    pub date: NaiveDate,
    pub timezone: String,
    pub events: SunEvents,
}

fn event_line(label: &str, event: &EventTime) {
    match event {
        EventTime::At(t) => println!("{:<12}: {}", label, t.format("%H:%M:%S %Z")),
        EventTime::AlwaysUp => println!("{:<12}: sun stays up", label),
        EventTime::NeverUp => println!("{:<12}: sun stays down", label),
        EventTime::Unavailable => println!("{:<12}: unavailable", label),
    }
}

/// Print sun events for one location in terminal format.
///
/// # Arguments
/// * `lat`, `lon` - Observer position in degrees
/// * `date` - Local calendar date
/// * `tz` - Display time zone
/// * `events` - Computed events
pub fn print_sun_events(lat: f64, lon: f64, date: NaiveDate, tz: Tz, events: &SunEvents) {
    println!("Location    : {:.4}°, {:.4}°", lat, lon);
    println!("Date        : {} ({})", date, tz.name());
    event_line("First light", &events.first_light);
    event_line("Sunrise", &events.sunrise);
    event_line("Sunset", &events.sunset);
    event_line("Last light", &events.last_light);

    match (events.day_length(), events.sunrise) {
        (Some(len), _) => println!("Daylight    : {}", format_hms(len)),
        (None, EventTime::AlwaysUp) => println!("Polar Day (Midnight Sun)."),
        (None, EventTime::NeverUp) => println!("Polar Night."),
        _ => {}
    }
}

// ===================== DOCUMENTS =====================

/// Write a pretty-printed JSON document to `path`, or stdout when None.
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let text = serde_json::to_string_pretty(value)?;
    match path {
        Some(p) => fs::write(p, text + "\n")?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", text)?;
        }
    }
    Ok(())
}
