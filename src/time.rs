//! Time and Timezone Utilities Module
//!
//! Provides local-time parsing, timezone resolution, the event [`TimeWindow`]
//! and formatting utilities.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_english::{Dialect, parse_date_string};
use chrono_tz::Tz;
use iana_time_zone::get_timezone;
use log::warn;
use std::sync::OnceLock;
use tzf_rs::DefaultFinder;

use crate::error::{ChromaError, Result};

// tzf-rs DefaultFinder is pre-compiled and very fast
static TZF_FINDER: OnceLock<DefaultFinder> = OnceLock::new();

// ===================== TIME PARSING =====================

/// Parse a local clock time in HH:MM[:SS[.fffffffff]] format.
///
/// # Errors
/// Returns `InvalidTimeOrTimezone` if none of the accepted formats match
pub fn parse_local_time(s: &str) -> Result<NaiveTime> {
    let formats = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

    for fmt in formats {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    Err(ChromaError::InvalidTimeOrTimezone(format!(
        "invalid time '{}': use HH:MM, HH:MM:SS or HH:MM:SS.ns",
        s
    )))
}

/// Parse a calendar date: ISO `YYYY-MM-DD` or an English expression such as
/// "today" or "tomorrow", relative to `anchor`.
pub fn parse_date(s: &str, anchor: DateTime<Tz>) -> Result<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    parse_date_string(s, anchor, Dialect::Us)
        .map(|dt| dt.date_naive())
        .map_err(|e| ChromaError::InvalidTimeOrTimezone(format!("invalid date '{}': {}", s, e)))
}

// ===================== TIMEZONE UTILITIES =====================

/// Get the system's configured timezone.
///
/// Falls back to UTC if the system timezone cannot be determined.
pub fn system_timezone() -> Tz {
    get_timezone().ok().and_then(|s| s.parse().ok()).unwrap_or(Tz::UTC)
}

/// Resolve timezone from geographic coordinates, or UTC if resolution fails.
pub fn resolve_timezone(lon: f64, lat: f64) -> Tz {
    let finder = TZF_FINDER.get_or_init(DefaultFinder::new);

    // Get the IANA string (e.g., "Asia/Shanghai")
    let tzid = finder.get_tz_name(lon, lat);

    tzid.parse::<Tz>().unwrap_or(Tz::UTC)
}

/// Interpret a timezone argument.
///
/// Accepts an IANA name, "UTC", "system" (host zone) or "location" (zone at
/// the given coordinates). Unknown names are rejected rather than silently
/// replaced by UTC.
pub fn parse_timezone(name: &str, lat: f64, lon: f64) -> Result<Tz> {
    match name {
        "system" => Ok(system_timezone()),
        "location" => Ok(resolve_timezone(lon, lat)),
        "utc" | "UTC" => Ok(Tz::UTC),
        other => other
            .parse::<Tz>()
            .map_err(|_| ChromaError::InvalidTimeOrTimezone(format!("unknown timezone '{}'", other))),
    }
}

/// Resolve a local wall-clock datetime against a timezone exactly once.
///
/// Ambiguous times (DST fall-back) take the earlier instant; non-existent
/// times (DST spring-forward gap) are rejected.
pub fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Tz>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) => Ok(t),
        chrono::LocalResult::Ambiguous(t1, t2) => {
            warn!(
                "Local time {} is ambiguous in {} (DST transition); using {} rather than {}",
                naive,
                tz,
                t1.format("%H:%M:%S %Z"),
                t2.format("%H:%M:%S %Z")
            );
            Ok(t1)
        }
        chrono::LocalResult::None => Err(ChromaError::InvalidTimeOrTimezone(format!(
            "local time {} does not exist in {} (DST gap)",
            naive, tz
        ))),
    }
}

// ===================== TIME WINDOW =====================

/// A local center time with a window length, e.g. 18:00 ± 30 min in
/// Asia/Shanghai on a given date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub date: NaiveDate,
    pub center: NaiveTime,
    pub window_minutes: u32,
    pub tz: Tz,
}

impl TimeWindow {
    pub fn new(date: NaiveDate, center: NaiveTime, window_minutes: u32, tz: Tz) -> Result<Self> {
        if window_minutes == 0 {
            return Err(ChromaError::InvalidTimeOrTimezone(
                "window length must be at least one minute".into(),
            ));
        }
        Ok(TimeWindow { date, center, window_minutes, tz })
    }

    fn half_window(&self) -> Duration {
        Duration::seconds(i64::from(self.window_minutes) * 30)
    }

    pub fn center_local(&self) -> Result<DateTime<Tz>> {
        resolve_local(self.tz, self.date, self.center)
    }

    pub fn start_local(&self) -> Result<DateTime<Tz>> {
        Ok(self.center_local()? - self.half_window())
    }

    pub fn end_local(&self) -> Result<DateTime<Tz>> {
        Ok(self.center_local()? + self.half_window())
    }

    pub fn start_utc(&self) -> Result<DateTime<Utc>> {
        Ok(self.start_local()?.with_timezone(&Utc))
    }

    pub fn end_utc(&self) -> Result<DateTime<Utc>> {
        Ok(self.end_local()?.with_timezone(&Utc))
    }

    /// Local wall-clock span, "HH:MM:SS - HH:MM:SS".
    pub fn local_label(&self) -> Result<String> {
        Ok(format!(
            "{} - {}",
            self.start_local()?.time().format("%H:%M:%S"),
            self.end_local()?.time().format("%H:%M:%S")
        ))
    }
}

// ===================== FORMATTING =====================

/// Format a duration in seconds as "Xh Ym Zs".
///
/// Negative durations are formatted by absolute value.
pub fn format_hms(seconds: i64) -> String {
    let total_seconds = seconds.abs();
    if total_seconds == 0 {
        return "0s".to_string();
    }

    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;

    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{}h", h));
    }
    if m > 0 {
        parts.push(format!("{}m", m));
    }
    if s > 0 {
        parts.push(format!("{}s", s));
    }

    parts.join(" ")
}

// ===================== TESTS =====================
