//! Meteorological Dataset Module
//!
//! Read-only, per-event gridded data behind the [`MeteoDataset`] trait:
//! nearest-neighbour lookups for named variables plus the run/forecast time
//! metadata. [`GridDataset`] is the file-backed implementation and
//! [`DatasetRegistry`] hands out shared handles keyed by event identifier.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ChromaError, Result};
use crate::geodesy::{longitude_to_360, normalize_longitude};

// ===================== VARIABLES =====================

/// Raw variables the scoring core reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    TotalCloud,
    HighCloud,
    MediumCloud,
    CloudBaseHeight,
    AerosolOpticalDepth,
}

/// Source field names accepted for each variable, canonical name first.
const SCHEMA: [(Variable, &[&str]); 5] = [
    (Variable::TotalCloud, &["total_cloud", "tcdc", "tcc"]),
    (Variable::HighCloud, &["high_cloud", "hcdc", "hcc"]),
    (Variable::MediumCloud, &["medium_cloud", "mcdc", "mcc"]),
    (Variable::CloudBaseHeight, &["cloud_base_height", "hgt", "gh"]),
    (Variable::AerosolOpticalDepth, &["aerosol_optical_depth", "aod550"]),
];

impl Variable {
    pub fn as_str(self) -> &'static str {
        match self {
            Variable::TotalCloud => "total_cloud",
            Variable::HighCloud => "high_cloud",
            Variable::MediumCloud => "medium_cloud",
            Variable::CloudBaseHeight => "cloud_base_height",
            Variable::AerosolOpticalDepth => "aerosol_optical_depth",
        }
    }

    /// Map a source field name (canonical or alias) to its variable.
    pub fn from_source_name(name: &str) -> Option<Variable> {
        let key = name.trim().to_ascii_lowercase();
        SCHEMA
            .iter()
            .find(|(_, names)| names.contains(&key.as_str()))
            .map(|(var, _)| *var)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeMeta {
    pub run_time_utc: DateTime<Utc>,
    pub forecast_time_utc: DateTime<Utc>,
}

impl TimeMeta {
    /// Calendar date of the forecast instant in `tz`.
    pub fn forecast_date(&self, tz: Tz) -> NaiveDate {
        self.forecast_time_utc.with_timezone(&tz).date_naive()
    }
}

// ===================== ACCESS TRAIT =====================

/// Queryable, read-only data for one event.
pub trait MeteoDataset: Send + Sync {
    fn event_id(&self) -> &str;

    fn time_meta(&self) -> &TimeMeta;

    /// Nearest-cell value of `var` at a point, or None when the variable is
    /// absent, the cell is missing or the point lies outside the grid.
    fn sample(&self, var: Variable, lat: f64, lon: f64) -> Option<f64>;
}

// ===================== GRID AXES =====================

/// One monotonic coordinate axis with nearest-index lookup.
#[derive(Debug, Clone)]
struct Axis {
    /// Values sorted ascending
    sorted: Vec<f64>,
    /// Whether the source order was descending
    descending: bool,
    half_cell: f64,
    /// Longitude axis in 0-360 convention
    lon_360: bool,
    /// Longitude axis covering the full circle
    periodic: bool,
}

impl Axis {
    fn latitude(values: &[f64]) -> Result<Self> {
        Self::build(values, false, "latitude")
    }

    fn longitude(values: &[f64]) -> Result<Self> {
        Self::build(values, true, "longitude")
    }

    fn build(values: &[f64], is_lon: bool, name: &str) -> Result<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return Err(ChromaError::DatasetFormat(format!("{} axis is empty or non-finite", name)));
        }

        let descending = values.len() > 1 && values[0] > values[1];
        let mut sorted = values.to_vec();
        if descending {
            sorted.reverse();
        }
        if sorted.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ChromaError::DatasetFormat(format!("{} axis is not strictly monotonic", name)));
        }

        let n = sorted.len();
        let span = sorted[n - 1] - sorted[0];
        let spacing = if n > 1 { span / (n - 1) as f64 } else { 0.0 };
        let lon_360 = is_lon && sorted[n - 1] > 180.0;
        let periodic = is_lon && n > 1 && span + spacing >= 360.0 - 1e-6;

        Ok(Axis { sorted, descending, half_cell: spacing / 2.0, lon_360, periodic })
    }

    fn len(&self) -> usize {
        self.sorted.len()
    }

    fn to_convention(&self, lon: f64) -> f64 {
        if self.lon_360 { longitude_to_360(lon) } else { normalize_longitude(lon) }
    }

    /// Index into the source-ordered axis of the value nearest `q`.
    fn nearest(&self, q: f64) -> Option<usize> {
        if !q.is_finite() {
            return None;
        }
        let n = self.len();
        let lo = self.sorted[0];
        let hi = self.sorted[n - 1];

        let sorted_idx = if q < lo - self.half_cell {
            if !self.periodic {
                return None;
            }
            n - 1
        } else if q > hi + self.half_cell {
            if !self.periodic {
                return None;
            }
            0
        } else {
            let p = self.sorted.partition_point(|&v| v < q);
            if p == 0 {
                0
            } else if p == n {
                n - 1
            } else if (q - self.sorted[p - 1]) <= (self.sorted[p] - q) {
                p - 1
            } else {
                p
            }
        };

        Some(if self.descending { n - 1 - sorted_idx } else { sorted_idx })
    }
}

/// One 2-D field on a lat/lon grid, row-major `[lat][lon]`.
#[derive(Debug, Clone)]
struct GridLayer {
    lat: Axis,
    lon: Axis,
    values: Vec<Option<f64>>,
}

impl GridLayer {
    fn new(lat: Axis, lon: Axis, rows: Vec<Vec<Option<f64>>>, name: &str) -> Result<Self> {
        if rows.len() != lat.len() || rows.iter().any(|r| r.len() != lon.len()) {
            return Err(ChromaError::DatasetFormat(format!(
                "'{}' does not match the {}x{} grid",
                name,
                lat.len(),
                lon.len()
            )));
        }
        let values = rows.into_iter().flatten().map(|v| v.filter(|x| x.is_finite())).collect();
        Ok(GridLayer { lat, lon, values })
    }

    fn sample(&self, lat: f64, lon: f64) -> Option<f64> {
        let i = self.lat.nearest(lat)?;
        let j = self.lon.nearest(self.lon.to_convention(lon))?;
        self.values[i * self.lon.len() + j]
    }
}

// ===================== FILE FORMAT =====================

#[derive(Debug, Deserialize)]
struct RawDataset {
    event: String,
    time_meta: TimeMeta,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    variables: HashMap<String, Vec<Vec<Option<f64>>>>,
    #[serde(default)]
    aod: Option<RawAerosol>,
}

/// Aerosol forecast steps, `aod550[step][lat][lon]`.
#[derive(Debug, Deserialize)]
struct RawAerosol {
    base_time_utc: DateTime<Utc>,
    step_hours: Vec<f64>,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    aod550: Vec<Vec<Vec<Option<f64>>>>,
}

/// Index of the step closest to `target`, hours after `base`.
fn nearest_step(base: DateTime<Utc>, steps: &[f64], target: DateTime<Utc>) -> Option<usize> {
    let hours = (target - base).num_seconds() as f64 / 3600.0;
    steps
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - hours).abs().total_cmp(&(b.1 - hours).abs()))
        .map(|(i, _)| i)
}

// ===================== GRID DATASET =====================

/// File-backed dataset for one event.
#[derive(Debug, Clone)]
pub struct GridDataset {
    event: String,
    time_meta: TimeMeta,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    layers: HashMap<Variable, GridLayer>,
}

impl GridDataset {
    /// Load a dataset from a JSON file.
    ///
    /// # Errors
    /// `Io` if the file cannot be read; `Json` or `DatasetFormat` if it is
    /// malformed
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let dataset = Self::from_json(&text)?;
        info!(
            "Loaded dataset '{}' from {} ({} variables, forecast {})",
            dataset.event,
            path.display(),
            dataset.layers.len(),
            dataset.time_meta.forecast_time_utc.to_rfc3339()
        );
        Ok(dataset)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawDataset = serde_json::from_str(text)?;
        let lat = Axis::latitude(&raw.latitude)?;
        let lon = Axis::longitude(&raw.longitude)?;

        let mut layers = HashMap::new();
        for (name, rows) in raw.variables {
            let Some(var) = Variable::from_source_name(&name) else {
                debug!("Ignoring unrecognised field '{}'", name);
                continue;
            };
            if layers.contains_key(&var) {
                return Err(ChromaError::DatasetFormat(format!("'{}' is provided more than once", var)));
            }
            layers.insert(var, GridLayer::new(lat.clone(), lon.clone(), rows, &name)?);
        }

        if let Some(aod) = raw.aod {
            if aod.step_hours.len() != aod.aod550.len() {
                return Err(ChromaError::DatasetFormat(format!(
                    "aod550 has {} steps but step_hours lists {}",
                    aod.aod550.len(),
                    aod.step_hours.len()
                )));
            }
            if let Some(step) = nearest_step(aod.base_time_utc, &aod.step_hours, raw.time_meta.forecast_time_utc) {
                debug!("Using aerosol step +{}h for {}", aod.step_hours[step], raw.event);
                let rows = aod.aod550.into_iter().nth(step).unwrap_or_default();
                let layer = GridLayer::new(Axis::latitude(&aod.latitude)?, Axis::longitude(&aod.longitude)?, rows, "aod550")?;
                layers.insert(Variable::AerosolOpticalDepth, layer);
            }
        }

        Ok(GridDataset {
            event: raw.event,
            time_meta: raw.time_meta,
            latitude: raw.latitude,
            longitude: raw.longitude,
            layers,
        })
    }

    pub fn has(&self, var: Variable) -> bool {
        self.layers.contains_key(&var)
    }

    /// Native latitude axis in file order.
    pub fn latitudes(&self) -> &[f64] {
        &self.latitude
    }

    /// Native longitude axis in file order and convention.
    pub fn longitudes(&self) -> &[f64] {
        &self.longitude
    }
}

impl MeteoDataset for GridDataset {
    fn event_id(&self) -> &str {
        &self.event
    }

    fn time_meta(&self) -> &TimeMeta {
        &self.time_meta
    }

    fn sample(&self, var: Variable, lat: f64, lon: f64) -> Option<f64> {
        self.layers.get(&var)?.sample(lat, lon)
    }
}

// ===================== REGISTRY =====================

/// Shared dataset handles keyed by event identifier, built once per run.
#[derive(Clone, Default)]
pub struct DatasetRegistry {
    handles: HashMap<String, Arc<dyn MeteoDataset>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under its own event identifier, replacing any
    /// previous one.
    pub fn insert(&mut self, dataset: Arc<dyn MeteoDataset>) {
        self.handles.insert(dataset.event_id().to_string(), dataset);
    }

    pub fn get(&self, event_id: &str) -> Option<Arc<dyn MeteoDataset>> {
        self.handles.get(event_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn event_ids(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }
}

impl fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetRegistry").field("events", &self.handles.keys().collect::<Vec<_>>()).finish()
    }
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> String {
        r#"{
            "event": "today_sunset_1800",
            "time_meta": {"run_time_utc": "2025-06-20T12:00:00Z",
                          "forecast_time_utc": "2025-06-21T10:00:00Z"},
            "latitude": [32.0, 31.0, 30.0],
            "longitude": [120.0, 121.0, 122.0],
            "variables": {
                "tcc":  [[10, 20, 30], [40, 50, 60], [70, 80, 90]],
                "hcdc": [[1, 2, 3], [4, null, 6], [7, 8, 9]],
                "gh":   [[3000, 3000, 3000], [7000, 7000, 7000], [2000, 2000, 2000]],
                "t2m":  [[0, 0, 0], [0, 0, 0], [0, 0, 0]]
            },
            "aod": {
                "base_time_utc": "2025-06-21T00:00:00Z",
                "step_hours": [0, 3, 6, 9, 12],
                "latitude": [30.0, 32.0],
                "longitude": [120.0, 122.0],
                "aod550": [
                    [[0.0, 0.0], [0.0, 0.0]], [[0.1, 0.1], [0.1, 0.1]],
                    [[0.2, 0.2], [0.2, 0.2]], [[0.3, 0.3], [0.3, 0.3]],
                    [[0.4, 0.4], [0.4, 0.4]]
                ]
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_forecast_date_in_local_zone() {
        let meta = TimeMeta {
            run_time_utc: "2025-06-20T12:00:00Z".parse().unwrap(),
            forecast_time_utc: "2025-06-21T17:00:00Z".parse().unwrap(),
        };
        // 01:00 the next morning in Shanghai, still the 21st in New York
        assert_eq!(meta.forecast_date(chrono_tz::Asia::Shanghai), NaiveDate::from_ymd_opt(2025, 6, 22).unwrap());
        assert_eq!(meta.forecast_date(chrono_tz::America::New_York), NaiveDate::from_ymd_opt(2025, 6, 21).unwrap());
    }

    #[test]
    fn test_aliases_resolve_to_variables() {
        assert_eq!(Variable::from_source_name("tcdc"), Some(Variable::TotalCloud));
        assert_eq!(Variable::from_source_name("TCC"), Some(Variable::TotalCloud));
        assert_eq!(Variable::from_source_name("hgt"), Some(Variable::CloudBaseHeight));
        assert_eq!(Variable::from_source_name("aod550"), Some(Variable::AerosolOpticalDepth));
        assert_eq!(Variable::from_source_name("t2m"), None);
        assert_eq!(Variable::HighCloud.to_string(), "high_cloud");
    }

    #[test]
    fn test_nearest_lookup_descending_latitudes() {
        let ds = GridDataset::from_json(&sample_json()).unwrap();
        assert_eq!(ds.sample(Variable::TotalCloud, 32.0, 120.0), Some(10.0));
        assert_eq!(ds.sample(Variable::TotalCloud, 30.1, 121.9), Some(90.0));
        assert_eq!(ds.sample(Variable::TotalCloud, 31.4, 120.6), Some(50.0));
        assert_eq!(ds.sample(Variable::CloudBaseHeight, 31.0, 121.0), Some(7000.0));
        assert!(!ds.has(Variable::MediumCloud));
        assert_eq!(ds.latitudes(), &[32.0, 31.0, 30.0]);
        assert_eq!(ds.sample(Variable::MediumCloud, 31.0, 121.0), None);
    }

    #[test]
    fn test_null_cell_does_not_resolve() {
        let ds = GridDataset::from_json(&sample_json()).unwrap();
        assert_eq!(ds.sample(Variable::HighCloud, 31.0, 121.0), None);
        assert_eq!(ds.sample(Variable::HighCloud, 31.0, 122.0), Some(6.0));
    }

    #[test]
    fn test_out_of_extent_does_not_resolve() {
        let ds = GridDataset::from_json(&sample_json()).unwrap();
        // Within half a cell of the edge
        assert_eq!(ds.sample(Variable::TotalCloud, 32.4, 119.6), Some(10.0));
        // Beyond it
        assert_eq!(ds.sample(Variable::TotalCloud, 32.6, 120.0), None);
        assert_eq!(ds.sample(Variable::TotalCloud, 31.0, 119.4), None);
        assert_eq!(ds.sample(Variable::TotalCloud, f64::NAN, 120.0), None);
    }

    #[test]
    fn test_signed_query_against_360_axis() {
        let json = r#"{
            "event": "e", "time_meta": {"run_time_utc": "2025-06-20T12:00:00Z",
                                         "forecast_time_utc": "2025-06-21T10:00:00Z"},
            "latitude": [0.0], "longitude": [0.0, 90.0, 180.0, 270.0],
            "variables": {"tcdc": [[1, 2, 3, 4]]}
        }"#;
        let ds = GridDataset::from_json(json).unwrap();
        assert_eq!(ds.sample(Variable::TotalCloud, 0.0, -90.0), Some(4.0));
        assert_eq!(ds.sample(Variable::TotalCloud, 0.0, 180.0), Some(3.0));
        // Full circle: just west of Greenwich wraps to the 0° column
        assert_eq!(ds.sample(Variable::TotalCloud, 0.0, -10.0), Some(1.0));
    }

    #[test]
    fn test_aerosol_step_nearest_to_forecast_time() {
        // Forecast 10:00 is 10h after base; nearest step is +9h
        let ds = GridDataset::from_json(&sample_json()).unwrap();
        let aod = ds.sample(Variable::AerosolOpticalDepth, 31.0, 121.0).unwrap();
        assert!((aod - 0.3).abs() < 1e-12, "picked wrong step: {}", aod);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let json = sample_json().replace("\"t2m\"", "\"tcdc\"");
        assert!(matches!(GridDataset::from_json(&json), Err(ChromaError::DatasetFormat(_))));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let json = sample_json().replace("[[10, 20, 30], [40, 50, 60], [70, 80, 90]]", "[[10, 20], [40, 50], [70, 80]]");
        assert!(matches!(GridDataset::from_json(&json), Err(ChromaError::DatasetFormat(_))));
    }

    #[test]
    fn test_load_from_file_and_registry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let ds = GridDataset::load(file.path()).unwrap();
        assert_eq!(ds.time_meta().forecast_time_utc.to_rfc3339(), "2025-06-21T10:00:00+00:00");

        let mut registry = DatasetRegistry::new();
        registry.insert(Arc::new(ds));
        assert_eq!(registry.len(), 1);
        let handle = registry.get("today_sunset_1800").expect("registered handle");
        assert_eq!(handle.sample(Variable::TotalCloud, 32.0, 120.0), Some(10.0));
        assert!(registry.get("tomorrow_sunrise_0600").is_none());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = GridDataset::load(&dir.path().join("absent.json"));
        assert!(matches!(r, Err(ChromaError::Io(_))));
    }
}
