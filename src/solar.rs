//! Solar Geometry Module
//!
//! Sun altitude/azimuth for a point and instant, terminator isochrones traced
//! by per-latitude bisection over longitude, and single-point sunrise/sunset
//! and twilight times. Uses the NREL SPA (Solar Position Algorithm).
//!
//! At a fixed instant the sun's altitude depends on longitude only through
//! the hour angle relative to the subsolar meridian: it peaks there and falls
//! monotonically towards the antisolar meridian on both sides. The morning
//! (rising) terminator lies west of the subsolar meridian and the evening
//! (setting) terminator east of it, so each branch is a monotone bracket that
//! bisection can search without wrapping problems at the antimeridian.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use log::{debug, error, warn};
use serde::{Serialize, Serializer};
use solar_positioning::{Horizon, spa, time::DeltaT, types::SunriseResult};

use crate::error::Result;
use crate::geodesy::{GeoPoint, normalize_longitude};
use crate::time::resolve_local;

/// Bisection steps per isochrone row; 180° / 2^20 is well under a meter.
pub const ISOCHRONE_ITERATIONS: usize = 20;

/// Rows whose converged altitude misses the horizon by this much are dropped.
pub const ISOCHRONE_TOLERANCE_DEG: f64 = 1.0;

// ===================== TYPES =====================

/// Topocentric sun position in degrees; azimuth clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
}

/// Which side of the subsolar meridian a terminator branch lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Morning side: sunrise, first light
    Rising,
    /// Evening side: sunset, last light
    Setting,
}

// ===================== SOLAR CALCULATION CONTEXT =====================

/// Context for solar position calculations at one fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct SolarCalc {
    /// The instant all positions are evaluated at
    pub instant: DateTime<Utc>,
    /// Delta-T correction for TT-UT1 difference
    pub delta_t: f64,
    /// Target sun altitude in degrees
    pub target: f64,
}

impl SolarCalc {
    pub fn new(instant: DateTime<Utc>, target: f64) -> Result<Self> {
        let delta_t = DeltaT::estimate_from_date(instant.year(), instant.month())?;
        Ok(SolarCalc { instant, delta_t, target })
    }

    /// Geometric sun position for a point (no refraction; the horizon angles
    /// already account for it).
    pub fn position(&self, lat: f64, lon: f64) -> Result<SunPosition> {
        let pos = spa::solar_position(
            self.instant,
            lat,
            normalize_longitude(lon),
            0.0,
            self.delta_t,
            None,
        )?;
        Ok(SunPosition { altitude_deg: pos.elevation_angle(), azimuth_deg: pos.azimuth() })
    }

    /// Difference between the sun's altitude at a point and the target.
    pub fn elevation_error(&self, lat: f64, lon: f64) -> Result<f64> {
        Ok(self.position(lat, lon)?.altitude_deg - self.target)
    }

    /// Longitude where the sun culminates at this instant.
    ///
    /// Coarse 10° scan along the equator, then a golden-section refinement
    /// around the best sample.
    pub fn subsolar_longitude(&self) -> Result<f64> {
        let mut best_lon = 0.0;
        let mut best_alt = f64::NEG_INFINITY;
        for k in -18..18 {
            let lon = f64::from(k) * 10.0;
            let alt = self.position(0.0, lon)?.altitude_deg;
            if alt > best_alt {
                best_alt = alt;
                best_lon = lon;
            }
        }

        let (lon, _) = golden_section_search(best_lon - 10.0, best_lon + 10.0, 1e-6, |lon| {
            self.position(0.0, lon).map(|p| p.altitude_deg).unwrap_or(f64::NEG_INFINITY)
        });
        Ok(normalize_longitude(lon))
    }

    /// Bisect the longitude on one terminator branch where the sun's altitude
    /// at `lat` equals the target.
    ///
    /// # Returns
    /// The longitude, or None when the converged altitude is not within
    /// [`ISOCHRONE_TOLERANCE_DEG`] of the target (polar day or night)
    pub fn solve_longitude(&self, lat: f64, subsolar_lon: f64, branch: Terminator) -> Result<Option<f64>> {
        // Hour-angle offset from the subsolar meridian
        let (mut lo, mut hi) = match branch {
            Terminator::Rising => (-180.0, 0.0),
            Terminator::Setting => (0.0, 180.0),
        };

        for _ in 0..ISOCHRONE_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            let err = self.elevation_error(lat, subsolar_lon + mid)?;

            // Guard against NaN from invalid inputs
            if !err.is_finite() {
                return Ok(None);
            }

            let above = err > 0.0;
            match (branch, above) {
                // Altitude grows towards the subsolar meridian (offset 0)
                (Terminator::Rising, true) | (Terminator::Setting, false) => hi = mid,
                (Terminator::Rising, false) | (Terminator::Setting, true) => lo = mid,
            }
        }

        let lon = normalize_longitude(subsolar_lon + (lo + hi) / 2.0);
        let err = self.elevation_error(lat, lon)?;
        if err.is_finite() && err.abs() < ISOCHRONE_TOLERANCE_DEG { Ok(Some(lon)) } else { Ok(None) }
    }
}

// ===================== PUBLIC OPERATIONS =====================

/// Sun altitude and azimuth at a point and instant.
pub fn sun_position(lat: f64, lon: f64, instant: DateTime<Utc>) -> Result<SunPosition> {
    SolarCalc::new(instant, 0.0)?.position(lat, lon)
}

/// Latitudes sampled by an isochrone: multiples of `step` inside the range,
/// truncated towards zero at both ends.
pub fn isochrone_latitudes(lat_range: (f64, f64), step: f64) -> Vec<f64> {
    if step <= 0.0 || lat_range.0 > lat_range.1 {
        return Vec::new();
    }
    let first = (lat_range.0 / step).trunc() as i64;
    let last = (lat_range.1 / step).trunc() as i64;
    (first..=last).map(|k| k as f64 * step).filter(|lat| (-90.0..=90.0).contains(lat)).collect()
}

/// Trace the curve of points where the sun sits at `horizon_deg` at `instant`.
///
/// One point per sampled latitude, ordered south to north. Latitudes with no
/// solution are omitted, so the result may be shorter than the sample count.
pub fn compute_isochrone(
    instant: DateTime<Utc>,
    horizon_deg: f64,
    lat_range: (f64, f64),
    lat_step: f64,
    branch: Terminator,
) -> Result<Vec<GeoPoint>> {
    let calc = SolarCalc::new(instant, horizon_deg)?;
    let subsolar = calc.subsolar_longitude()?;

    let lats = isochrone_latitudes(lat_range, lat_step);
    let mut points = Vec::with_capacity(lats.len());
    for lat in &lats {
        if let Some(lon) = calc.solve_longitude(*lat, subsolar, branch)? {
            points.push(GeoPoint::new(*lat, (lon * 1e4).round() / 1e4));
        }
    }

    debug!(
        "Isochrone at {} ({:?}, {:.3}°): {}/{} latitudes resolved",
        instant,
        branch,
        horizon_deg,
        points.len(),
        lats.len()
    );
    Ok(points)
}

// ===================== SUN EVENTS =====================

/// One event time for a point: a timestamp, or a polar sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTime {
    At(DateTime<Tz>),
    /// Polar day: the sun never drops to the horizon
    AlwaysUp,
    /// Polar night: the sun never reaches the horizon
    NeverUp,
    /// The computation failed
    Unavailable,
}

impl EventTime {
    /// ISO-8601 text, "always_up", "never_up", or None.
    pub fn as_text(&self) -> Option<String> {
        match self {
            EventTime::At(t) => Some(t.to_rfc3339()),
            EventTime::AlwaysUp => Some("always_up".to_string()),
            EventTime::NeverUp => Some("never_up".to_string()),
            EventTime::Unavailable => None,
        }
    }

    pub fn time(&self) -> Option<DateTime<Tz>> {
        match self {
            EventTime::At(t) => Some(*t),
            _ => None,
        }
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.as_text() {
            Some(s) => serializer.serialize_some(&s),
            None => serializer.serialize_none(),
        }
    }
}

/// Sunrise, sunset and civil twilight bounds for one point and local date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SunEvents {
    pub first_light: EventTime,
    pub sunrise: EventTime,
    pub sunset: EventTime,
    pub last_light: EventTime,
}

impl SunEvents {
    fn all(value: EventTime) -> Self {
        SunEvents { first_light: value, sunrise: value, sunset: value, last_light: value }
    }

    /// Day length in seconds, when both sunrise and sunset exist.
    pub fn day_length(&self) -> Option<i64> {
        Some((self.sunset.time()? - self.sunrise.time()?).num_seconds())
    }
}

/// Classify one horizon crossing pair for the day.
fn rise_set(res: &SunriseResult<DateTime<Tz>>) -> (EventTime, EventTime) {
    match res {
        SunriseResult::RegularDay { sunrise, sunset, .. } => {
            (EventTime::At(*sunrise), EventTime::At(*sunset))
        }
        SunriseResult::AllDay { .. } => (EventTime::AlwaysUp, EventTime::AlwaysUp),
        SunriseResult::AllNight { .. } => (EventTime::NeverUp, EventTime::NeverUp),
    }
}

/// Sunrise/sunset (−0.833°) and first/last light (−6°) for a point on a
/// local calendar date.
///
/// Computation errors are logged and reported as [`EventTime::Unavailable`]
/// rather than failing the call.
pub fn sun_events(lat: f64, lon: f64, date: NaiveDate, tz: Tz) -> SunEvents {
    // Local noon is the most stable anchor for a calendar day
    let noon = match NaiveTime::from_hms_opt(12, 0, 0).map(|t| resolve_local(tz, date, t)) {
        Some(Ok(t)) => t,
        _ => {
            warn!("Local noon on {} does not exist in {}", date, tz);
            return SunEvents::all(EventTime::Unavailable);
        }
    };

    let compute = || -> Result<SunEvents> {
        let delta_t = DeltaT::estimate_from_date(date.year(), date.month())?;
        let lon = normalize_longitude(lon);
        let standard = spa::sunrise_sunset_for_horizon(noon, lat, lon, delta_t, Horizon::SunriseSunset)?;
        let civil = spa::sunrise_sunset_for_horizon(noon, lat, lon, delta_t, Horizon::CivilTwilight)?;

        let (sunrise, sunset) = rise_set(&standard);
        let (first_light, last_light) = rise_set(&civil);
        Ok(SunEvents { first_light, sunrise, sunset, last_light })
    };

    match compute() {
        Ok(events) => {
            if events.sunrise == EventTime::AlwaysUp {
                warn!("Sun never sets at ({}, {}) on {} (polar day)", lat, lon, date);
            } else if events.sunrise == EventTime::NeverUp {
                warn!("Sun never rises at ({}, {}) on {} (polar night)", lat, lon, date);
            }
            events
        }
        Err(e) => {
            error!("Sun events failed at ({}, {}) on {}: {}", lat, lon, date, e);
            SunEvents::all(EventTime::Unavailable)
        }
    }
}

// ===================== HELPER FUNCTIONS =====================

/// Golden Section Search for the maximum of a unimodal function `f` within
/// `[min, max]`.
///
/// Returns (x_at_max, max_value)
fn golden_section_search<F>(min: f64, max: f64, tol: f64, mut f: F) -> (f64, f64)
where
    F: FnMut(f64) -> f64,
{
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let resphi = 2.0 - phi; // approx 0.382

    let mut a = min;
    let mut b = max;

    let mut c = a + resphi * (b - a);
    let mut d = b - resphi * (b - a);

    let mut fc = f(c);
    let mut fd = f(d);

    while (b - a).abs() > tol {
        if fc < fd {
            // Max is in [c, b]
            a = c;
            c = d;
            fc = fd;
            d = b - resphi * (b - a);
            fd = f(d);
        } else {
            // Max is in [a, d]
            b = d;
            d = c;
            fd = fc;
            c = a + resphi * (b - a);
            fc = f(c);
        }
    }

    ((a + b) / 2.0, fc.max(fd))
}

// ===================== TESTS =====================
