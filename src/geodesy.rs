//! Geographic and Geometry Module
//!
//! Spherical-Earth helpers shared by the region builder, the point filter and
//! the light-path sampler: longitude conventions, great-circle destination
//! points and the horizon angles that define each solar event.

use serde::{Deserialize, Serialize};

// ===================== CONSTANTS =====================

/// Mean Earth radius in kilometers (spherical model)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Sun altitude at standard sunrise/sunset: refraction plus solar semi-diameter
pub const STANDARD_HORIZON_DEG: f64 = -0.833;

/// Sun altitude at the edge of civil twilight
pub const CIVIL_HORIZON_DEG: f64 = -6.0;

// ===================== TYPES =====================

/// A point on Earth in degrees. Longitude may use any convention until it is
/// normalized for geometric tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// Same point with longitude in [-180, 180].
    pub fn normalized(self) -> Self {
        GeoPoint { lat: self.lat, lon: normalize_longitude(self.lon) }
    }
}

// ===================== LONGITUDE CONVENTIONS =====================

/// Normalize a longitude to the [-180, 180] range.
///
/// 180 stays 180 and -180 stays -180; everything else wraps.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 { 180.0 } else { wrapped }
}

/// Convert a longitude to the [0, 360) convention used by global model grids.
pub fn longitude_to_360(lon: f64) -> f64 {
    lon.rem_euclid(360.0)
}

// ===================== GREAT-CIRCLE GEOMETRY =====================

/// Point reached by travelling `distance_km` from (`lat_deg`, `lon_deg`) along
/// the initial bearing `azimuth_deg` (clockwise from north).
///
/// # Returns
/// (latitude, longitude) in degrees, longitude normalized to [-180, 180]
pub fn destination_point(lat_deg: f64, lon_deg: f64, azimuth_deg: f64, distance_km: f64) -> (f64, f64) {
    let lat1 = lat_deg.to_radians();
    let lon1 = lon_deg.to_radians();
    let theta = azimuth_deg.to_radians();
    let delta = distance_km / EARTH_RADIUS_KM;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    (lat2.to_degrees(), normalize_longitude(lon2.to_degrees()))
}

/// Great-circle distance in kilometers (haversine).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

// ===================== TESTS =====================
