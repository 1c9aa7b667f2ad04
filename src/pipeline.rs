//! Parallel Scoring Pipeline Module
//!
//! Splits the filtered candidate points into chunks, scores the chunks on a
//! dedicated rayon pool and merges the results in completion order. Each
//! chunk resolves its own dataset handle from the [`DatasetRegistry`] by
//! event identifier. Per-point and per-chunk failures are logged and
//! contained; only a run where nothing scored is an error.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetRegistry, MeteoDataset};
use crate::error::{ChromaError, Result};
use crate::geodesy::GeoPoint;
use crate::score::{ScoreBreakdown, ScoringConfig, point_variables};
use crate::solar::SolarCalc;

// ===================== CONFIGURATION =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker threads in the pool
    pub workers: usize,
    pub min_chunk: usize,
    pub max_chunk: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            min_chunk: 100,
            max_chunk: 500,
        }
    }
}

impl PipelineConfig {
    /// Points per chunk: `max(min_chunk, n / (2 * workers))` capped at
    /// `max_chunk`.
    pub fn chunk_size(&self, n_points: usize) -> usize {
        let per_worker = n_points / (2 * self.workers.max(1));
        per_worker.max(self.min_chunk).min(self.max_chunk).max(1)
    }
}

// ===================== WORK UNITS =====================

/// One unit of work dispatched to the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkChunk {
    pub index: usize,
    pub event_id: String,
    pub points: Vec<GeoPoint>,
}

/// Partition points into consecutive chunks of [`PipelineConfig::chunk_size`].
pub fn partition(points: &[GeoPoint], event_id: &str, cfg: &PipelineConfig) -> Vec<WorkChunk> {
    let size = cfg.chunk_size(points.len());
    points
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| WorkChunk { index, event_id: event_id.to_string(), points: chunk.to_vec() })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub lat: f64,
    pub lon: f64,
    pub score: f64,
}

/// Result of one chunk.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub scored: Vec<ScoredPoint>,
    /// Points skipped for missing inputs
    pub dropped: usize,
    /// Points whose evaluation errored or panicked
    pub failed: usize,
}

/// Aggregate of a whole run; counters are summed over events in a batch.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub scored: Vec<ScoredPoint>,
    pub dropped: usize,
    pub failed_points: usize,
    pub failed_chunks: usize,
}

// ===================== WORKER =====================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Score one point; Ok(None) when a required input is missing.
fn score_point(
    point: &GeoPoint,
    calc: &SolarCalc,
    dataset: &dyn MeteoDataset,
    scoring: &ScoringConfig,
) -> Result<Option<f64>> {
    let azimuth = calc.position(point.lat, point.lon)?.azimuth_deg;
    let vars = point_variables(point.lat, point.lon, azimuth, dataset, scoring);
    match ScoreBreakdown::evaluate(&vars, scoring) {
        Ok(b) => Ok(Some(b.score)),
        Err(ChromaError::DataUnavailable { variable }) => {
            debug!("Dropping ({:.4}, {:.4}): {} unavailable", point.lat, point.lon, variable);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Score every point of a chunk.
///
/// The dataset handle is resolved here from the registry; a missing handle
/// fails the whole chunk. A failing point is logged and omitted.
pub fn score_chunk(chunk: &WorkChunk, registry: &DatasetRegistry, scoring: &ScoringConfig) -> Result<ChunkOutcome> {
    let dataset = registry.get(&chunk.event_id).ok_or_else(|| ChromaError::WorkerChunkFailure {
        chunk: chunk.index,
        reason: format!("no dataset registered for event '{}'", chunk.event_id),
    })?;

    // Azimuth at the forecast instant, geometric (no refraction)
    let calc = SolarCalc::new(dataset.time_meta().forecast_time_utc, 0.0)?;

    let mut outcome = ChunkOutcome { scored: Vec::with_capacity(chunk.points.len()), ..Default::default() };
    for point in &chunk.points {
        let result = catch_unwind(AssertUnwindSafe(|| score_point(point, &calc, dataset.as_ref(), scoring)));
        match result {
            Ok(Ok(Some(score))) => outcome.scored.push(ScoredPoint { lat: point.lat, lon: point.lon, score }),
            Ok(Ok(None)) => outcome.dropped += 1,
            Ok(Err(e)) => {
                error!("Chunk {}: point ({:.4}, {:.4}) failed: {}", chunk.index, point.lat, point.lon, e);
                outcome.failed += 1;
            }
            Err(payload) => {
                error!(
                    "Chunk {}: point ({:.4}, {:.4}) panicked: {}",
                    chunk.index,
                    point.lat,
                    point.lon,
                    panic_message(payload.as_ref())
                );
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

// ===================== DISPATCHER =====================

/// Fan-out/fan-in scorer over a fixed registry of datasets.
pub struct ScoringPipeline {
    registry: Arc<DatasetRegistry>,
    scoring: ScoringConfig,
    config: PipelineConfig,
}

impl ScoringPipeline {
    pub fn new(registry: Arc<DatasetRegistry>, scoring: ScoringConfig, config: PipelineConfig) -> Self {
        ScoringPipeline { registry, scoring, config }
    }

    /// Score `points` against the dataset registered for `event_id`.
    ///
    /// Output order follows chunk completion and is not deterministic.
    ///
    /// # Errors
    /// * `EmptyResult` - no point scored across all chunks
    /// * `WorkerPool` - the thread pool could not be started
    pub fn run(&self, event_id: &str, points: &[GeoPoint]) -> Result<PipelineReport> {
        if points.is_empty() {
            warn!("No candidate points for '{}'", event_id);
            return Err(ChromaError::EmptyResult { event: event_id.to_string() });
        }

        let started = Instant::now();
        let workers = self.config.workers.max(1);
        let chunks = partition(points, event_id, &self.config);
        info!(
            "Scoring {} points for '{}': {} chunks of up to {} on {} workers",
            points.len(),
            event_id,
            chunks.len(),
            self.config.chunk_size(points.len()),
            workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("chromasky-worker-{}", i))
            .build()?;

        let (tx, rx) = mpsc::channel();
        for chunk in chunks {
            let tx = tx.clone();
            let registry = Arc::clone(&self.registry);
            let scoring = self.scoring;
            pool.spawn(move || {
                let index = chunk.index;
                let result = catch_unwind(AssertUnwindSafe(|| score_chunk(&chunk, &registry, &scoring)))
                    .unwrap_or_else(|payload| {
                        Err(ChromaError::WorkerChunkFailure { chunk: index, reason: panic_message(payload.as_ref()) })
                    });
                // The receiver outlives every sender
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut report = PipelineReport::default();
        for (index, result) in rx {
            match result {
                Ok(outcome) => {
                    debug!("Chunk {} done: {} scored, {} dropped", index, outcome.scored.len(), outcome.dropped);
                    report.scored.extend(outcome.scored);
                    report.dropped += outcome.dropped;
                    report.failed_points += outcome.failed;
                }
                Err(e) => {
                    error!("Chunk {} failed, its points are omitted: {}", index, e);
                    report.failed_chunks += 1;
                }
            }
        }

        info!(
            "Scoring '{}' finished in {:.2?}: {} scored, {} dropped, {} failed points, {} failed chunks",
            event_id,
            started.elapsed(),
            report.scored.len(),
            report.dropped,
            report.failed_points,
            report.failed_chunks
        );

        if report.scored.is_empty() {
            return Err(ChromaError::EmptyResult { event: event_id.to_string() });
        }
        Ok(report)
    }

    /// Score `points` against each event in turn and keep every point's best
    /// score across events.
    ///
    /// An event that scores nothing is skipped with a warning.
    ///
    /// # Errors
    /// * `EmptyResult` - no event scored any point
    /// * `WorkerPool` - the thread pool could not be started
    pub fn run_batch(&self, event_ids: &[String], points: &[GeoPoint]) -> Result<PipelineReport> {
        let mut best: HashMap<(u64, u64), ScoredPoint> = HashMap::with_capacity(points.len());
        let mut merged = PipelineReport::default();

        for event_id in event_ids {
            let report = match self.run(event_id, points) {
                Ok(r) => r,
                Err(ChromaError::EmptyResult { .. }) => {
                    warn!("Event '{}' scored no points; skipping", event_id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            merged.dropped += report.dropped;
            merged.failed_points += report.failed_points;
            merged.failed_chunks += report.failed_chunks;
            for p in report.scored {
                best.entry((p.lat.to_bits(), p.lon.to_bits()))
                    .and_modify(|b| {
                        if p.score > b.score {
                            *b = p;
                        }
                    })
                    .or_insert(p);
            }
        }

        if best.is_empty() {
            return Err(ChromaError::EmptyResult { event: event_ids.join(",") });
        }
        merged.scored = best.into_values().collect();
        info!("Batch of {} events merged into {} scored points", event_ids.len(), merged.scored.len());
        Ok(merged)
    }
}

// ===================== TESTS =====================
