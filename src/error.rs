//! Error Taxonomy Module
//!
//! Every fallible operation in the crate reports through [`ChromaError`].
//! Geometry and validation errors are fatal to a single request; data and
//! worker errors are recovered inside the scoring pipeline and only surface
//! in aggregate as [`ChromaError::EmptyResult`].

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::dataset::Variable;

#[derive(Debug, Error)]
pub enum ChromaError {
    /// No isochrone could be traced for a whole instant (polar day/night).
    #[error("no event region at {instant}: the horizon is never crossed inside the latitude band")]
    GeometryUnavailable { instant: DateTime<Utc> },

    #[error("invalid time or timezone: {0}")]
    InvalidTimeOrTimezone(String),

    /// A required raw variable did not resolve for a point.
    #[error("variable '{variable}' is unavailable for this point")]
    DataUnavailable { variable: Variable },

    #[error("chunk {chunk} failed: {reason}")]
    WorkerChunkFailure { chunk: usize, reason: String },

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Nothing survived filtering and scoring.
    #[error("no scored points for event '{event}'")]
    EmptyResult { event: String },

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("solar position error: {0}")]
    Solar(String),

    #[error("dataset format error: {0}")]
    DatasetFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChromaError>;

impl From<solar_positioning::Error> for ChromaError {
    fn from(e: solar_positioning::Error) -> Self {
        ChromaError::Solar(e.to_string())
    }
}
