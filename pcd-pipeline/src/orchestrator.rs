use std::path::PathBuf;

use pcd_core::batch::PredictionBatch;
use pcd_interpolator::{interpolate_labels, NearestNeighborInterpolator};

use crate::{
    accumulator::{FlushRequest, TileAccumulator},
    store::{TileInterpolation, TileStore, TileTarget as _},
    PipelineError,
};

/// Outcome of one flushed tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileReport {
    pub tile: PathBuf,
    pub output: Option<PathBuf>,
    pub points: usize,
    pub sampled_points: usize,
    pub accuracy: Option<f64>,
}

/// Drives batches through the accumulator and flushes every completed tile.
pub struct Orchestrator<S: TileStore> {
    store: S,
    interpolator: NearestNeighborInterpolator,
    accumulator: TileAccumulator<S::Tile>,
    reports: Vec<TileReport>,
}

impl<S: TileStore> Orchestrator<S> {
    pub fn new(store: S, interpolator: NearestNeighborInterpolator) -> Self {
        Self {
            store,
            interpolator,
            accumulator: TileAccumulator::new(),
            reports: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn reports(&self) -> &[TileReport] {
        &self.reports
    }

    /// Feeds one batch. A failed flush aborts only that tile: every slice of
    /// the batch is still ingested and the first error is returned at the end,
    /// so later batches can still be pushed.
    pub fn push_batch(&mut self, batch: PredictionBatch) -> Result<(), PipelineError> {
        log::debug!(
            "batch with {} sub-sampled points over {} tile slices",
            batch.len(),
            batch.tile_paths().len()
        );
        let mut first_error = None;
        for slice in batch.into_slices() {
            let store = &mut self.store;
            let result = match self.accumulator.ingest(slice, |path| store.open(path)) {
                Ok(Some(request)) => self.flush(request),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                if first_error.is_some() {
                    log::error!("{}", err);
                } else {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Flushes the last open tile and returns the reports of every tile.
    pub fn finish(mut self) -> Result<Vec<TileReport>, PipelineError> {
        let store = &mut self.store;
        if let Some(request) = self.accumulator.finalize(|path| store.open(path))? {
            self.flush(request)?;
        }
        Ok(self.reports)
    }

    /// Consumes the whole batch stream, stopping at the first error, and
    /// returns the paths of all written tiles.
    pub fn run<I, E>(mut self, batches: I) -> Result<Vec<PathBuf>, PipelineError>
    where
        I: IntoIterator<Item = Result<PredictionBatch, E>>,
        E: Into<PipelineError>,
    {
        for batch in batches {
            self.push_batch(batch.map_err(Into::<PipelineError>::into)?)?;
        }
        let reports = self.finish()?;
        Ok(reports.into_iter().filter_map(|report| report.output).collect())
    }

    fn flush(&mut self, request: FlushRequest<S::Tile>) -> Result<(), PipelineError> {
        let FlushRequest {
            tile_path,
            tile,
            positions,
            logits,
            ground_truth,
        } = request;

        let targets = tile.positions();
        log::info!(
            "interpolating {} predictions onto {} points of {:?}",
            positions.len(),
            targets.len(),
            tile_path
        );
        let interpolated = self
            .interpolator
            .interpolate_features(&positions, &logits, targets)?;

        let labels = match ground_truth {
            Some(ground_truth) if !ground_truth.positions.is_empty() => Some(interpolate_labels(
                &ground_truth.positions,
                &ground_truth.labels,
                targets,
            )?),
            Some(_) => {
                log::warn!("ground truth for {:?} is empty, skipping labels", tile_path);
                None
            }
            None => None,
        };

        let points = targets.len();
        let interpolation = TileInterpolation {
            logits: interpolated,
            targets: labels,
        };
        let accuracy = interpolation.accuracy();
        if let Some(accuracy) = accuracy {
            log::info!("accuracy on {:?}: {:.4}", tile_path, accuracy);
        }

        let output = self.store.write(tile, &interpolation)?;
        self.reports.push(TileReport {
            tile: tile_path,
            output,
            points,
            sampled_points: positions.len(),
            accuracy,
        });
        Ok(())
    }
}
