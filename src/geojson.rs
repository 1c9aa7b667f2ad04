//! GeoJSON Output Module
//!
//! Serde types for the two documents the crate produces: the scored-region
//! point collection and the event-region polygon collection. Coordinates are
//! `[lon, lat]`.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ChromaError, Result};
use crate::grid::Density;
use crate::pipeline::ScoredPoint;
use crate::region::{EventRegion, EventType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature<P> {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: P,
}

impl<P> Feature<P> {
    pub fn new(geometry: Geometry, properties: P) -> Self {
        Feature { kind: "Feature".to_string(), geometry, properties }
    }
}

/// A FeatureCollection with optional top-level properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection<P, M> {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature<P>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<M>,
}

impl<P, M> FeatureCollection<P, M> {
    pub fn new(features: Vec<Feature<P>>, properties: Option<M>) -> Self {
        FeatureCollection { kind: "FeatureCollection".to_string(), features, properties }
    }
}

// ===================== SCORED REGION =====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreProperties {
    pub score: f64,
}

/// Top-level properties of a scored-region document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMetadata {
    pub event_name: String,
    pub density: Density,
    pub window_minutes: u32,
    pub latitude_range: [f64; 2],
}

pub type ScoredCollection = FeatureCollection<ScoreProperties, ScoredMetadata>;

/// One Point feature per scored point, in the order given.
pub fn assemble(scored: &[ScoredPoint], metadata: ScoredMetadata) -> ScoredCollection {
    let features = scored
        .iter()
        .map(|p| Feature::new(Geometry::Point { coordinates: [p.lon, p.lat] }, ScoreProperties { score: p.score }))
        .collect();
    FeatureCollection::new(features, Some(metadata))
}

/// Recover `(lat, lon, score)` triples from a scored-region document.
///
/// # Errors
/// `Json` for malformed documents, `DatasetFormat` for non-Point features
pub fn parse_scored(text: &str) -> Result<Vec<ScoredPoint>> {
    let collection: ScoredCollection = serde_json::from_str(text)?;
    collection
        .features
        .into_iter()
        .map(|f| match f.geometry {
            Geometry::Point { coordinates: [lon, lat] } => Ok(ScoredPoint { lat, lon, score: f.properties.score }),
            Geometry::Polygon { .. } => {
                Err(ChromaError::DatasetFormat("scored document contains a polygon feature".into()))
            }
        })
        .collect()
}

// ===================== REGION POLYGONS =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionProperties {
    pub event: EventType,
    pub date: NaiveDate,
    /// "HH:MM:SS - HH:MM:SS" in `timezone`
    pub time_window_local: String,
    pub timezone: String,
}

pub type RegionCollection = FeatureCollection<RegionProperties, ()>;

/// One Polygon feature per member polygon of the region.
///
/// A single center time gives a single feature; several center times give
/// one feature each, in center-time order.
pub fn region_document(region: &EventRegion, date: NaiveDate, tz: Tz) -> RegionCollection {
    let features = region
        .polygons
        .iter()
        .map(|polygon| {
            let ring = polygon.ring().iter().map(|p| [p.lon, p.lat]).collect();
            let time_window_local = format!(
                "{} - {}",
                polygon.start_utc.with_timezone(&tz).format("%H:%M:%S"),
                polygon.end_utc.with_timezone(&tz).format("%H:%M:%S")
            );
            let properties =
                RegionProperties { event: polygon.event, date, time_window_local, timezone: tz.name().to_string() };
            Feature::new(Geometry::Polygon { coordinates: vec![ring] }, properties)
        })
        .collect();
    FeatureCollection::new(features, None)
}

// ===================== TESTS =====================
