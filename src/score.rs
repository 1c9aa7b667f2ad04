//! Sky Quality Scoring Module
//!
//! Four independent factors in [0, 1] multiplied into a 0-10 composite:
//!
//! * canvas: high + medium cloud to catch the light
//! * light path: clear sky towards the sun so the light reaches the canvas
//! * air quality: aerosol optical depth at 550 nm
//! * cloud altitude: higher bases stay lit longer
//!
//! Every function here is pure. Missing inputs follow fixed rules: the canvas,
//! light-path and altitude factors drop to 0, the aerosol factor falls back to
//! a neutral 0.5, and [`composite`] refuses to score a point whose required
//! inputs are absent.

use serde::{Deserialize, Serialize};

use crate::dataset::{MeteoDataset, Variable};
use crate::error::{ChromaError, Result};
use crate::geodesy::destination_point;

/// Aerosol factor when no AOD value is available.
pub const NEUTRAL_AIR_QUALITY: f64 = 0.5;

/// AOD at or below this is perfectly clear air.
pub const AOD_CLEAR: f64 = 0.2;

/// AOD at or above this blocks the colours entirely.
pub const AOD_OPAQUE: f64 = 0.8;

// ===================== CONFIGURATION =====================

/// Shape of the canvas factor below the cover threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasCurve {
    /// Constant `low` below the threshold
    Step { low: f64 },
    /// Linear from `base` at 0 % up to 1.0 at the threshold
    Ramp { base: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Combined high + medium cover (%) at which the canvas factor saturates
    pub canvas_threshold: f64,
    pub canvas_curve: CanvasCurve,
    /// Exponent applied to light-path clarity
    pub light_path_exponent: f64,
    /// Number of total-cloud samples along the sun azimuth
    pub path_samples: usize,
    /// Distance of the farthest path sample in km
    pub path_scan_km: f64,
    /// When false the aerosol factor is fixed at 1.0
    pub use_aod: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            canvas_threshold: 20.0,
            canvas_curve: CanvasCurve::Step { low: 0.1 },
            light_path_exponent: 2.0,
            path_samples: 5,
            path_scan_km: 400.0,
            use_aod: true,
        }
    }
}

// ===================== FACTORS =====================

/// Canvas factor from high and medium cloud cover (%).
pub fn score_canvas(high_pct: Option<f64>, medium_pct: Option<f64>, cfg: &ScoringConfig) -> f64 {
    let (Some(high), Some(medium)) = (high_pct, medium_pct) else {
        return 0.0;
    };
    if !high.is_finite() || !medium.is_finite() {
        return 0.0;
    }

    let cover = (high + medium).clamp(0.0, 100.0);
    if cover >= cfg.canvas_threshold {
        return 1.0;
    }
    match cfg.canvas_curve {
        CanvasCurve::Step { low } => low,
        CanvasCurve::Ramp { base } => base + (1.0 - base) * cover / cfg.canvas_threshold,
    }
}

/// Light-path factor: `((100 - avg) / 100) ^ exponent`.
pub fn score_light_path(avg_cloud_pct: Option<f64>, exponent: f64) -> f64 {
    match avg_cloud_pct {
        Some(avg) if avg.is_finite() => ((100.0 - avg) / 100.0).clamp(0.0, 1.0).powf(exponent),
        _ => 0.0,
    }
}

/// Air-quality factor: 1.0 up to [`AOD_CLEAR`], 0.0 from [`AOD_OPAQUE`],
/// linear in between; [`NEUTRAL_AIR_QUALITY`] when unknown.
pub fn score_air_quality(aod: Option<f64>) -> f64 {
    match aod {
        Some(v) if v.is_finite() => {
            if v <= AOD_CLEAR {
                1.0
            } else if v >= AOD_OPAQUE {
                0.0
            } else {
                1.0 - (v - AOD_CLEAR) / (AOD_OPAQUE - AOD_CLEAR)
            }
        }
        _ => NEUTRAL_AIR_QUALITY,
    }
}

/// Cloud-altitude factor from the cloud base height in meters.
pub fn score_cloud_altitude(base_height_m: Option<f64>) -> f64 {
    match base_height_m {
        Some(h) if h > 6000.0 => 1.0,
        Some(h) if h > 2500.0 => 0.7,
        Some(h) if h.is_finite() => 0.3,
        _ => 0.0,
    }
}

// ===================== COMPOSITE =====================

/// Raw inputs for one point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointVariables {
    pub high_cloud: Option<f64>,
    pub medium_cloud: Option<f64>,
    pub cloud_base_height: Option<f64>,
    pub aerosol_optical_depth: Option<f64>,
    /// Mean total cloud along the light path, see [`avg_path_cloudiness`]
    pub avg_path_cloud: Option<f64>,
}

impl PointVariables {
    /// First required input that is missing, if any.
    pub fn missing(&self) -> Option<Variable> {
        let required = [
            (Variable::HighCloud, self.high_cloud),
            (Variable::MediumCloud, self.medium_cloud),
            (Variable::CloudBaseHeight, self.cloud_base_height),
            (Variable::TotalCloud, self.avg_path_cloud),
        ];
        required.into_iter().find(|(_, v)| !v.is_some_and(f64::is_finite)).map(|(var, _)| var)
    }
}

/// Per-factor view of one point's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub canvas: f64,
    pub light_path: f64,
    pub air_quality: f64,
    pub cloud_altitude: f64,
    /// Product of the factors times 10, one decimal
    pub score: f64,
}

impl ScoreBreakdown {
    /// # Errors
    /// `DataUnavailable` naming the first missing required input
    pub fn evaluate(vars: &PointVariables, cfg: &ScoringConfig) -> Result<Self> {
        if let Some(variable) = vars.missing() {
            return Err(ChromaError::DataUnavailable { variable });
        }

        let canvas = score_canvas(vars.high_cloud, vars.medium_cloud, cfg);
        let light_path = score_light_path(vars.avg_path_cloud, cfg.light_path_exponent);
        let air_quality = if cfg.use_aod { score_air_quality(vars.aerosol_optical_depth) } else { 1.0 };
        let cloud_altitude = score_cloud_altitude(vars.cloud_base_height);

        let raw = canvas * light_path * air_quality * cloud_altitude * 10.0;
        Ok(ScoreBreakdown { canvas, light_path, air_quality, cloud_altitude, score: round1(raw) })
    }
}

/// Composite 0-10 score, or None when a required input is missing.
pub fn composite(vars: &PointVariables, cfg: &ScoringConfig) -> Option<f64> {
    ScoreBreakdown::evaluate(vars, cfg).ok().map(|b| b.score)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ===================== LIGHT PATH SAMPLING =====================

/// Mean total cloud cover (%) along the sun's azimuth from a point.
///
/// Samples at `k / n * path_scan_km` for `k = 1..=n`; unresolved samples are
/// skipped.
///
/// # Returns
/// The mean of the resolved samples, or None if none resolved
pub fn avg_path_cloudiness(
    lat: f64,
    lon: f64,
    sun_azimuth_deg: f64,
    dataset: &dyn MeteoDataset,
    cfg: &ScoringConfig,
) -> Option<f64> {
    let n = cfg.path_samples;
    if n == 0 {
        return None;
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for k in 1..=n {
        let distance = k as f64 / n as f64 * cfg.path_scan_km;
        let (s_lat, s_lon) = destination_point(lat, lon, sun_azimuth_deg, distance);
        if let Some(v) = dataset.sample(Variable::TotalCloud, s_lat, s_lon)
            && v.is_finite()
        {
            sum += v;
            count += 1;
        }
    }

    if count == 0 { None } else { Some(sum / count as f64) }
}

/// Gather one point's raw inputs from a dataset.
pub fn point_variables(
    lat: f64,
    lon: f64,
    sun_azimuth_deg: f64,
    dataset: &dyn MeteoDataset,
    cfg: &ScoringConfig,
) -> PointVariables {
    PointVariables {
        high_cloud: dataset.sample(Variable::HighCloud, lat, lon),
        medium_cloud: dataset.sample(Variable::MediumCloud, lat, lon),
        cloud_base_height: dataset.sample(Variable::CloudBaseHeight, lat, lon),
        aerosol_optical_depth: dataset.sample(Variable::AerosolOpticalDepth, lat, lon),
        avg_path_cloud: avg_path_cloudiness(lat, lon, sun_azimuth_deg, dataset, cfg),
    }
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TimeMeta;
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};

    fn full_vars() -> PointVariables {
        PointVariables {
            high_cloud: Some(15.0),
            medium_cloud: Some(10.0),
            cloud_base_height: Some(7000.0),
            aerosol_optical_depth: Some(0.2),
            avg_path_cloud: Some(20.0),
        }
    }

    /// Total cloud is 100 % east of 120°E and `west` elsewhere.
    struct HalfCloudy {
        meta: TimeMeta,
        west: Option<f64>,
    }

    impl HalfCloudy {
        fn new(west: Option<f64>) -> Self {
            let t = Utc.with_ymd_and_hms(2025, 6, 21, 10, 0, 0).unwrap();
            HalfCloudy { meta: TimeMeta { run_time_utc: t, forecast_time_utc: t }, west }
        }
    }

    impl MeteoDataset for HalfCloudy {
        fn event_id(&self) -> &str {
            "half"
        }
        fn time_meta(&self) -> &TimeMeta {
            &self.meta
        }
        fn sample(&self, var: Variable, _lat: f64, lon: f64) -> Option<f64> {
            match var {
                Variable::TotalCloud if lon > 120.0 => Some(100.0),
                Variable::TotalCloud => self.west,
                _ => None,
            }
        }
    }

    #[test]
    fn test_canvas_threshold_and_step() {
        let cfg = ScoringConfig::default();
        assert_eq!(score_canvas(Some(15.0), Some(10.0), &cfg), 1.0);
        assert_eq!(score_canvas(Some(20.0), Some(0.0), &cfg), 1.0);
        assert_eq!(score_canvas(Some(0.0), Some(0.0), &cfg), 0.1);
        assert_eq!(score_canvas(None, Some(50.0), &cfg), 0.0);
        assert_eq!(score_canvas(Some(50.0), None, &cfg), 0.0);
    }

    #[test]
    fn test_canvas_ramp_non_decreasing() {
        let cfg = ScoringConfig { canvas_curve: CanvasCurve::Ramp { base: 0.2 }, ..Default::default() };
        assert_abs_diff_eq!(score_canvas(Some(0.0), Some(0.0), &cfg), 0.2);
        assert_abs_diff_eq!(score_canvas(Some(5.0), Some(5.0), &cfg), 0.6, epsilon = 1e-12);
        let mut prev = 0.0;
        for cover in 0..=30 {
            let s = score_canvas(Some(f64::from(cover)), Some(0.0), &cfg);
            assert!(s >= prev, "ramp decreased at {}%: {} < {}", cover, s, prev);
            assert!(s <= 1.0);
            prev = s;
        }
    }

    #[test]
    fn test_light_path_exponent() {
        assert_abs_diff_eq!(score_light_path(Some(20.0), 2.0), 0.64, epsilon = 1e-12);
        assert_abs_diff_eq!(score_light_path(Some(20.0), 1.0), 0.8, epsilon = 1e-12);
        assert_eq!(score_light_path(Some(100.0), 2.0), 0.0);
        assert_eq!(score_light_path(None, 2.0), 0.0);
    }

    #[test]
    fn test_air_quality_ramp() {
        assert_eq!(score_air_quality(Some(0.1)), 1.0);
        assert_eq!(score_air_quality(Some(0.8)), 0.0);
        assert_abs_diff_eq!(score_air_quality(Some(0.5)), 0.5, epsilon = 1e-12);
        assert_eq!(score_air_quality(None), NEUTRAL_AIR_QUALITY);
        assert_eq!(score_air_quality(Some(f64::NAN)), NEUTRAL_AIR_QUALITY);
    }

    #[test]
    fn test_cloud_altitude_bands() {
        assert_eq!(score_cloud_altitude(Some(7000.0)), 1.0);
        assert_eq!(score_cloud_altitude(Some(6000.0)), 0.7);
        assert_eq!(score_cloud_altitude(Some(2500.0)), 0.3);
        assert_eq!(score_cloud_altitude(Some(f64::NAN)), 0.0);
        assert_eq!(score_cloud_altitude(None), 0.0);
    }

    #[test]
    fn test_composite_reference_point() {
        let b = ScoreBreakdown::evaluate(&full_vars(), &ScoringConfig::default()).unwrap();
        assert_eq!(b.canvas, 1.0);
        assert_abs_diff_eq!(b.light_path, 0.64, epsilon = 1e-12);
        assert_eq!(b.air_quality, 1.0);
        assert_eq!(b.cloud_altitude, 1.0);
        assert_eq!(b.score, 6.4);
    }

    #[test]
    fn test_composite_missing_inputs_drop_point() {
        let cfg = ScoringConfig::default();
        let cases = [
            PointVariables { high_cloud: None, ..full_vars() },
            PointVariables { medium_cloud: None, ..full_vars() },
            PointVariables { cloud_base_height: None, ..full_vars() },
            PointVariables { avg_path_cloud: None, ..full_vars() },
        ];
        for vars in cases {
            assert_eq!(composite(&vars, &cfg), None, "scored despite missing input: {:?}", vars);
        }

        // Missing aerosol is neutral, not fatal
        let vars = PointVariables { aerosol_optical_depth: None, ..full_vars() };
        assert_eq!(composite(&vars, &cfg), Some(3.2));
    }

    #[test]
    fn test_missing_input_is_named() {
        let vars = PointVariables { cloud_base_height: None, ..full_vars() };
        match ScoreBreakdown::evaluate(&vars, &ScoringConfig::default()) {
            Err(ChromaError::DataUnavailable { variable }) => assert_eq!(variable, Variable::CloudBaseHeight),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_aod_disabled_fixes_factor() {
        let cfg = ScoringConfig { use_aod: false, ..Default::default() };
        let vars = PointVariables { aerosol_optical_depth: Some(0.8), ..full_vars() };
        assert_eq!(composite(&vars, &cfg), Some(6.4));
    }

    #[test]
    fn test_path_samples_follow_azimuth() {
        let cfg = ScoringConfig::default();
        let ds = HalfCloudy::new(Some(0.0));
        // Looking east from 118°E: first sample (80 km) is still west of 120°E
        let east = avg_path_cloudiness(30.0, 118.0, 90.0, &ds, &cfg).unwrap();
        assert!(east > 50.0 && east < 100.0, "east mean {}", east);
        // Looking west: all clear
        assert_eq!(avg_path_cloudiness(30.0, 118.0, 270.0, &ds, &cfg), Some(0.0));
    }

    #[test]
    fn test_path_unresolved_samples() {
        let cfg = ScoringConfig::default();
        let ds = HalfCloudy::new(None);
        assert_eq!(avg_path_cloudiness(30.0, 110.0, 270.0, &ds, &cfg), None);
        // Only the eastern samples resolve
        assert_eq!(avg_path_cloudiness(30.0, 119.0, 90.0, &ds, &cfg), Some(100.0));
    }
}
