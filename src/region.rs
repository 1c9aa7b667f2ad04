//! Event Region Module
//!
//! Builds the polygon bounding the places where a solar event happens within
//! a local time window: the isochrone at the window start, walked south to
//! north, joined to the isochrone at the window end walked back north to
//! south.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use geo::{Area, Contains, Coord, LineString, Point, Polygon};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ChromaError, Result};
use crate::geodesy::{CIVIL_HORIZON_DEG, GeoPoint, STANDARD_HORIZON_DEG, normalize_longitude};
use crate::solar::{Terminator, compute_isochrone};
use crate::time::TimeWindow;

/// Latitude spacing of isochrone rows in degrees
pub const DEFAULT_LAT_STEP: f64 = 2.0;

// ===================== EVENT TYPES =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Sunrise,
    Sunset,
    FirstLight,
    LastLight,
}

impl EventType {
    pub const ALL: [EventType; 4] =
        [EventType::Sunrise, EventType::Sunset, EventType::FirstLight, EventType::LastLight];

    /// Sun altitude that defines the event.
    pub fn horizon_deg(self) -> f64 {
        match self {
            EventType::Sunrise | EventType::Sunset => STANDARD_HORIZON_DEG,
            EventType::FirstLight | EventType::LastLight => CIVIL_HORIZON_DEG,
        }
    }

    pub fn terminator(self) -> Terminator {
        match self {
            EventType::Sunrise | EventType::FirstLight => Terminator::Rising,
            EventType::Sunset | EventType::LastLight => Terminator::Setting,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Sunrise => "sunrise",
            EventType::Sunset => "sunset",
            EventType::FirstLight => "first_light",
            EventType::LastLight => "last_light",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ChromaError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == key)
            .ok_or_else(|| ChromaError::UnknownEvent(s.to_string()))
    }
}

// ===================== EVENT POLYGON =====================

/// Closed ring bounding one event window.
///
/// The ring is not checked for self-intersection. Longitudes along the ring
/// are unwrapped to stay continuous, so a band crossing the antimeridian may
/// run past ±180; [`EventPolygon::contains`] accounts for that.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPolygon {
    pub event: EventType,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    /// Closed ring: first vertex repeated at the end
    ring: Vec<GeoPoint>,
    polygon: Polygon<f64>,
}

impl EventPolygon {
    pub fn new(event: EventType, start_utc: DateTime<Utc>, end_utc: DateTime<Utc>, ring: Vec<GeoPoint>) -> Self {
        let coords: Vec<Coord<f64>> = ring.iter().map(|p| Coord { x: p.lon, y: p.lat }).collect();
        let polygon = Polygon::new(LineString::from(coords), vec![]);
        EventPolygon { event, start_utc, end_utc, ring, polygon }
    }

    pub fn ring(&self) -> &[GeoPoint] {
        &self.ring
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Planar area in square degrees.
    pub fn area_deg2(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Strict interior test; the point's longitude is normalized first.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        let lon = normalize_longitude(point.lon);
        [lon, lon - 360.0, lon + 360.0]
            .into_iter()
            .any(|x| self.polygon.contains(&Point::new(x, point.lat)))
    }

    /// Whether `instant` lies within the window, bounds included.
    pub fn covers_instant(&self, instant: DateTime<Utc>) -> bool {
        self.start_utc <= instant && instant <= self.end_utc
    }
}

/// Join two isochrones into a closed ring:
/// `start + reverse(end) + [start[0]]`.
pub fn close_ring(start_line: &[GeoPoint], end_line: &[GeoPoint]) -> Vec<GeoPoint> {
    let mut ring: Vec<GeoPoint> = start_line.iter().chain(end_line.iter().rev()).copied().collect();
    if let Some(first) = start_line.first() {
        ring.push(*first);
    }
    unwrap_longitudes(&mut ring);
    ring
}

/// Shift vertices by ±360° so consecutive longitudes never jump by more than
/// half a turn.
fn unwrap_longitudes(ring: &mut [GeoPoint]) {
    for i in 1..ring.len() {
        let prev = ring[i - 1].lon;
        let mut lon = ring[i].lon;
        while lon - prev > 180.0 {
            lon -= 360.0;
        }
        while lon - prev < -180.0 {
            lon += 360.0;
        }
        ring[i].lon = lon;
    }
}

/// Build the polygon where `event` happens within `window`.
///
/// # Errors
/// * `InvalidTimeOrTimezone` - the window's local times cannot be resolved
/// * `GeometryUnavailable` - either isochrone is empty (polar day/night)
pub fn build_event_polygon(
    event: EventType,
    window: &TimeWindow,
    lat_range: (f64, f64),
    lat_step: f64,
) -> Result<EventPolygon> {
    let start_utc = window.start_utc()?;
    let end_utc = window.end_utc()?;

    info!("Computing '{}' region for UTC window {} to {}", event, start_utc.to_rfc3339(), end_utc.to_rfc3339());

    let horizon = event.horizon_deg();
    let branch = event.terminator();
    let start_line = compute_isochrone(start_utc, horizon, lat_range, lat_step, branch)?;
    if start_line.is_empty() {
        return Err(ChromaError::GeometryUnavailable { instant: start_utc });
    }
    let end_line = compute_isochrone(end_utc, horizon, lat_range, lat_step, branch)?;
    if end_line.is_empty() {
        return Err(ChromaError::GeometryUnavailable { instant: end_utc });
    }

    let ring = close_ring(&start_line, &end_line);
    Ok(EventPolygon::new(event, start_utc, end_utc, ring))
}

// ===================== EVENT REGION =====================

/// Union of event polygons for several center times of the same event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRegion {
    pub event: EventType,
    pub polygons: Vec<EventPolygon>,
}

impl EventRegion {
    pub fn single(polygon: EventPolygon) -> Self {
        EventRegion { event: polygon.event, polygons: vec![polygon] }
    }

    /// One polygon per center time; windows with no geometry are skipped.
    ///
    /// # Errors
    /// * `InvalidTimeOrTimezone` - any window is malformed
    /// * `GeometryUnavailable` - no window produced a polygon
    pub fn for_center_times(
        event: EventType,
        date: NaiveDate,
        centers: &[NaiveTime],
        window_minutes: u32,
        tz: Tz,
        lat_range: (f64, f64),
    ) -> Result<Self> {
        let mut polygons = Vec::with_capacity(centers.len());
        let mut last_failure = None;

        for center in centers {
            let window = TimeWindow::new(date, *center, window_minutes, tz)?;
            match build_event_polygon(event, &window, lat_range, DEFAULT_LAT_STEP) {
                Ok(p) => polygons.push(p),
                Err(ChromaError::GeometryUnavailable { instant }) => {
                    warn!("No '{}' geometry for center time {}; skipping", event, center);
                    last_failure = Some(instant);
                }
                Err(e) => return Err(e),
            }
        }

        if polygons.is_empty() {
            let instant = match last_failure {
                Some(t) => t,
                None => TimeWindow::new(date, NaiveTime::MIN, window_minutes, tz)?.start_utc()?,
            };
            return Err(ChromaError::GeometryUnavailable { instant });
        }
        Ok(EventRegion { event, polygons })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.polygons.iter().any(|p| p.contains(point))
    }

    /// Whether any member window contains `instant`.
    pub fn covers_instant(&self, instant: DateTime<Utc>) -> bool {
        self.polygons.iter().any(|p| p.covers_instant(instant))
    }
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_local_time;
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;

    fn midsummer() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 21).unwrap()
    }

    fn sunset_window(minutes: u32) -> TimeWindow {
        TimeWindow::new(midsummer(), parse_local_time("19:00").unwrap(), minutes, Shanghai).unwrap()
    }

    #[test]
    fn test_event_type_parsing_and_horizons() {
        assert_eq!("sunset".parse::<EventType>().unwrap(), EventType::Sunset);
        assert_eq!("First-Light".parse::<EventType>().unwrap(), EventType::FirstLight);
        assert!(matches!("moonrise".parse::<EventType>(), Err(ChromaError::UnknownEvent(_))));
        assert_eq!(EventType::Sunrise.horizon_deg(), -0.833);
        assert_eq!(EventType::LastLight.horizon_deg(), -6.0);
        assert_eq!(EventType::FirstLight.terminator(), Terminator::Rising);
    }

    #[test]
    fn test_close_ring_order() {
        let a = [GeoPoint::new(0.0, 10.0), GeoPoint::new(2.0, 11.0)];
        let b = [GeoPoint::new(0.0, 20.0), GeoPoint::new(2.0, 21.0)];
        let ring = close_ring(&a, &b);
        let lons: Vec<f64> = ring.iter().map(|p| p.lon).collect();
        assert_eq!(lons, vec![10.0, 11.0, 21.0, 20.0, 10.0]);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_ring_across_antimeridian_is_unwrapped() {
        let a = [GeoPoint::new(0.0, 175.0), GeoPoint::new(2.0, 176.0)];
        let b = [GeoPoint::new(0.0, -175.0), GeoPoint::new(2.0, -174.0)];
        let ring = close_ring(&a, &b);
        assert!(ring.windows(2).all(|w| (w[1].lon - w[0].lon).abs() <= 180.0));

        let now = Utc::now();
        let poly = EventPolygon::new(EventType::Sunset, now, now, ring);
        assert!(poly.contains(&GeoPoint::new(1.0, 179.9)));
        assert!(poly.contains(&GeoPoint::new(1.0, -179.9)));
        assert!(!poly.contains(&GeoPoint::new(1.0, 0.0)));
    }

    #[test]
    fn test_sunset_polygon_covers_the_evening_terminator() {
        let poly = build_event_polygon(EventType::Sunset, &sunset_window(60), (15.0, 55.0), 2.0).unwrap();
        assert_eq!(poly.ring().first(), poly.ring().last());
        assert!(poly.ring().len() >= 2 * 20);

        // Shanghai sets at ~19:00 local on the solstice
        assert!(poly.contains(&GeoPoint::new(31.2, 121.5)));
        // Early afternoon in Paris during this window
        assert!(!poly.contains(&GeoPoint::new(48.0, 2.0)));
    }

    #[test]
    fn test_wider_window_never_shrinks_region() {
        let narrow = build_event_polygon(EventType::Sunset, &sunset_window(30), (15.0, 55.0), 2.0).unwrap();
        let wide = build_event_polygon(EventType::Sunset, &sunset_window(60), (15.0, 55.0), 2.0).unwrap();
        assert!(
            narrow.area_deg2() <= wide.area_deg2(),
            "area({}) > area({})",
            narrow.area_deg2(),
            wide.area_deg2()
        );
        assert!(narrow.area_deg2() > 0.0);
    }

    #[test]
    fn test_polar_band_has_no_geometry() {
        // Entire band in polar day at the June solstice
        let r = build_event_polygon(EventType::Sunset, &sunset_window(60), (80.0, 88.0), 2.0);
        assert!(matches!(r, Err(ChromaError::GeometryUnavailable { .. })));
    }

    #[test]
    fn test_region_union_of_center_times() {
        let centers: Vec<NaiveTime> =
            ["18:00", "19:00", "20:00"].iter().map(|s| parse_local_time(s).unwrap()).collect();
        let region =
            EventRegion::for_center_times(EventType::Sunset, midsummer(), &centers, 60, Shanghai, (15.0, 55.0))
                .unwrap();
        assert_eq!(region.polygons.len(), 3);
        assert_eq!(region.event, EventType::Sunset);
        assert!(region.contains(&GeoPoint::new(31.2, 121.5)));

        // 19:00 and 22:00 Shanghai
        assert!(region.covers_instant(Utc.with_ymd_and_hms(2025, 6, 21, 11, 0, 0).unwrap()));
        assert!(!region.covers_instant(Utc.with_ymd_and_hms(2025, 6, 21, 14, 0, 0).unwrap()));
    }

    #[test]
    fn test_polygon_matches_ring() {
        let ring = vec![
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(4.0, 10.0),
            GeoPoint::new(4.0, 12.0),
            GeoPoint::new(0.0, 12.0),
            GeoPoint::new(0.0, 10.0),
        ];
        let now = Utc::now();
        let poly = EventPolygon::new(EventType::Sunrise, now, now, ring.clone());

        let exterior: Vec<(f64, f64)> = poly.polygon().exterior().points().map(|p| (p.y(), p.x())).collect();
        let expected: Vec<(f64, f64)> = ring.iter().map(|p| (p.lat, p.lon)).collect();
        assert_eq!(exterior, expected);
        assert_eq!(poly.area_deg2(), 8.0);
        assert!(poly.contains(&GeoPoint::new(2.0, 11.0)));
        assert!(!poly.contains(&GeoPoint::new(2.0, 13.0)));
    }

    #[test]
    fn test_region_on_forecast_date_covers_forecast_time() {
        // Tomorrow's 17:00 sunset in Shanghai
        let meta = crate::dataset::TimeMeta {
            run_time_utc: Utc.with_ymd_and_hms(2025, 6, 21, 0, 0, 0).unwrap(),
            forecast_time_utc: Utc.with_ymd_and_hms(2025, 6, 22, 9, 0, 0).unwrap(),
        };
        let date = meta.forecast_date(Shanghai);
        let at = |s: &str| [parse_local_time(s).unwrap()];

        let matching =
            EventRegion::for_center_times(EventType::Sunset, date, &at("17:00"), 60, Shanghai, (15.0, 55.0)).unwrap();
        assert!(matching.covers_instant(meta.forecast_time_utc));

        let today_default =
            EventRegion::for_center_times(EventType::Sunset, midsummer(), &at("18:00"), 60, Shanghai, (15.0, 55.0))
                .unwrap();
        assert!(!today_default.covers_instant(meta.forecast_time_utc));
    }

    #[test]
    fn test_region_with_no_geometry_fails() {
        let centers = [parse_local_time("19:00").unwrap()];
        let r = EventRegion::for_center_times(EventType::Sunset, midsummer(), &centers, 60, Shanghai, (80.0, 88.0));
        assert!(matches!(r, Err(ChromaError::GeometryUnavailable { .. })));
    }
}
