//! Grid Sampling Module
//!
//! Candidate coordinates for a scoring run: the native grid clipped to a
//! latitude band and thinned by a density-dependent stride.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geodesy::GeoPoint;

/// Spatial coarseness of a scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    /// Every 8th native cell, for quick interactive passes
    Coarse,
    /// Every 4th native cell
    #[default]
    Medium,
    /// Every native cell
    Fine,
}

impl Density {
    /// Stride in native grid cells along each axis.
    pub fn stride(self) -> usize {
        match self {
            Density::Coarse => 8,
            Density::Medium => 4,
            Density::Fine => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Density::Coarse => "coarse",
            Density::Medium => "medium",
            Density::Fine => "fine",
        }
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Density {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coarse" | "low" => Ok(Density::Coarse),
            "medium" => Ok(Density::Medium),
            "fine" | "high" => Ok(Density::Fine),
            other => Err(format!("unknown density '{}': use coarse, medium or fine", other)),
        }
    }
}

/// Cartesian product of the clipped, thinned axes.
///
/// Latitudes outside `lat_clip` (inclusive) are dropped before thinning, so
/// the stride starts from the first retained row. Longitudes are passed
/// through in their native convention.
pub fn sample_grid(native_lats: &[f64], native_lons: &[f64], lat_clip: (f64, f64), density: Density) -> Vec<GeoPoint> {
    let (lo, hi) = if lat_clip.0 <= lat_clip.1 { lat_clip } else { (lat_clip.1, lat_clip.0) };
    let stride = density.stride();

    let lats: Vec<f64> =
        native_lats.iter().copied().filter(|lat| (lo..=hi).contains(lat)).step_by(stride).collect();
    let lons: Vec<f64> = native_lons.iter().copied().step_by(stride).collect();

    let mut points = Vec::with_capacity(lats.len() * lons.len());
    for lat in &lats {
        points.extend(lons.iter().map(|lon| GeoPoint::new(*lat, *lon)));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_density_strides_shrink_output() {
        let lats = axis(0.0, 0.25, 241);
        let lons = axis(70.0, 0.25, 241);
        let fine = sample_grid(&lats, &lons, (15.0, 55.0), Density::Fine).len();
        let medium = sample_grid(&lats, &lons, (15.0, 55.0), Density::Medium).len();
        let coarse = sample_grid(&lats, &lons, (15.0, 55.0), Density::Coarse).len();
        assert!(fine > medium && medium > coarse, "{} / {} / {}", fine, medium, coarse);
        // 15.0..=55.0 at 0.25° is 161 rows
        assert_eq!(fine, 161 * 241);
    }

    #[test]
    fn test_latitude_clip_inclusive_any_axis_order() {
        let lats = axis(60.0, -1.0, 61); // 60 down to 0
        let lons = vec![100.0];
        let pts = sample_grid(&lats, &lons, (55.0, 15.0), Density::Fine);
        assert_eq!(pts.len(), 41);
        assert!(pts.iter().all(|p| (15.0..=55.0).contains(&p.lat)));
        assert_eq!(pts[0].lat, 55.0);
    }

    #[test]
    fn test_empty_when_band_misses_grid() {
        let lats = axis(-10.0, 1.0, 5);
        assert!(sample_grid(&lats, &[0.0, 1.0], (15.0, 55.0), Density::Fine).is_empty());
    }

    #[test]
    fn test_density_parsing() {
        assert_eq!("COARSE".parse::<Density>().unwrap(), Density::Coarse);
        assert_eq!("high".parse::<Density>().unwrap(), Density::Fine);
        assert!("extreme".parse::<Density>().is_err());
        assert_eq!(Density::Medium.to_string(), "medium");
    }
}
