//! Buffers the slices of the tile currently being assembled.
//!
//! Slices of one tile must arrive contiguously. When a slice for a different
//! tile shows up, the open tile is handed back as a [`FlushRequest`] and the
//! new slice is parked until the next call, so the caller can flush before
//! the next tile is loaded. A tile that fails to open is marked failed and its
//! remaining slices are dropped.

use std::{
    collections::HashSet,
    mem,
    path::{Path, PathBuf},
};

use pcd_core::{
    batch::{GroundTruthSlice, TileSlice},
    features::FeatureMatrix,
    Position,
};

use crate::PipelineError;

/// A closed tile with everything needed to interpolate and persist it.
#[derive(Debug)]
pub struct FlushRequest<T> {
    pub tile_path: PathBuf,
    pub tile: T,
    pub positions: Vec<Position>,
    pub logits: FeatureMatrix,
    pub ground_truth: Option<GroundTruthSlice>,
}

#[derive(Debug)]
struct OpenTile<T> {
    key: PathBuf,
    tile: T,
    positions: Vec<Position>,
    logits: FeatureMatrix,
    ground_truth: Option<GroundTruthSlice>,
}

impl<T> OpenTile<T> {
    fn new(key: PathBuf, tile: T) -> Self {
        Self {
            key,
            tile,
            positions: Vec::new(),
            logits: FeatureMatrix::default(),
            ground_truth: None,
        }
    }

    fn append(&mut self, slice: TileSlice) -> Result<(), PipelineError> {
        self.logits.append(&slice.logits)?;
        self.positions.extend(slice.positions);
        if let Some(targets) = slice.targets {
            let ground_truth = self.ground_truth.get_or_insert_with(Default::default);
            ground_truth.positions.extend(targets.positions);
            ground_truth.labels.extend(targets.labels);
        }
        Ok(())
    }

    fn into_flush(self) -> FlushRequest<T> {
        FlushRequest {
            tile_path: self.key,
            tile: self.tile,
            positions: self.positions,
            logits: self.logits,
            ground_truth: self.ground_truth,
        }
    }
}

#[derive(Debug)]
enum Slot<T> {
    Idle,
    Accumulating(OpenTile<T>),
    ReadyToFlush(TileSlice),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Idle
    }
}

/// Observable accumulator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState<'a> {
    Idle,
    Accumulating(&'a Path),
    /// The previous tile was handed out for flushing; this tile opens next.
    ReadyToFlush(&'a Path),
}

#[derive(Debug)]
pub struct TileAccumulator<T> {
    slot: Slot<T>,
    closed: HashSet<PathBuf>,
    failed: HashSet<PathBuf>,
}

impl<T> Default for TileAccumulator<T> {
    fn default() -> Self {
        Self {
            slot: Slot::Idle,
            closed: HashSet::new(),
            failed: HashSet::new(),
        }
    }
}

impl<T> TileAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TileState<'_> {
        match &self.slot {
            Slot::Idle => TileState::Idle,
            Slot::Accumulating(open) => TileState::Accumulating(&open.key),
            Slot::ReadyToFlush(pending) => TileState::ReadyToFlush(&pending.tile),
        }
    }

    /// Number of tiles handed out for flushing so far.
    pub fn closed_tiles(&self) -> usize {
        self.closed.len()
    }

    pub fn is_failed(&self, tile: &Path) -> bool {
        self.failed.contains(tile)
    }

    fn start<F>(&mut self, slice: TileSlice, open: &mut F) -> Result<(), PipelineError>
    where
        F: FnMut(&Path) -> Result<T, PipelineError>,
    {
        log::info!("opening tile {:?}", slice.tile);
        let key = slice.tile.clone();
        let opened = open(&key).and_then(|tile| {
            let mut open_tile = OpenTile::new(key.clone(), tile);
            open_tile.append(slice)?;
            Ok(open_tile)
        });
        match opened {
            Ok(open_tile) => {
                self.slot = Slot::Accumulating(open_tile);
                Ok(())
            }
            Err(err) => {
                self.failed.insert(key);
                Err(err)
            }
        }
    }

    fn close(&mut self, open: OpenTile<T>) -> FlushRequest<T> {
        log::debug!(
            "closing tile {:?} with {} sub-sampled points",
            open.key,
            open.positions.len()
        );
        self.closed.insert(open.key.clone());
        open.into_flush()
    }

    /// Buffers one slice. `open` loads a tile's full-resolution points the
    /// first time the tile is seen.
    pub fn ingest<F>(
        &mut self,
        slice: TileSlice,
        mut open: F,
    ) -> Result<Option<FlushRequest<T>>, PipelineError>
    where
        F: FnMut(&Path) -> Result<T, PipelineError>,
    {
        if self.closed.contains(&slice.tile) {
            return Err(PipelineError::OutOfOrderTile(slice.tile));
        }
        if self.failed.contains(&slice.tile) {
            log::warn!("dropping slice of failed tile {:?}", slice.tile);
            return Ok(None);
        }

        match mem::take(&mut self.slot) {
            Slot::Idle => {
                self.start(slice, &mut open)?;
                Ok(None)
            }
            Slot::ReadyToFlush(pending) => {
                if let Err(err) = self.start(pending, &mut open) {
                    // the incoming slice opens on the next call
                    if !self.failed.contains(&slice.tile) {
                        self.slot = Slot::ReadyToFlush(slice);
                    }
                    return Err(err);
                }
                self.ingest(slice, open)
            }
            Slot::Accumulating(mut current) if current.key == slice.tile => {
                let appended = current.append(slice);
                self.slot = Slot::Accumulating(current);
                appended.map(|_| None)
            }
            Slot::Accumulating(current) => {
                let request = self.close(current);
                self.slot = Slot::ReadyToFlush(slice);
                Ok(Some(request))
            }
        }
    }

    /// Closes whatever tile remains at the end of the stream.
    pub fn finalize<F>(&mut self, mut open: F) -> Result<Option<FlushRequest<T>>, PipelineError>
    where
        F: FnMut(&Path) -> Result<T, PipelineError>,
    {
        match mem::take(&mut self.slot) {
            Slot::Idle => Ok(None),
            Slot::ReadyToFlush(pending) => {
                self.start(pending, &mut open)?;
                self.finalize(open)
            }
            Slot::Accumulating(current) => Ok(Some(self.close(current))),
        }
    }
}
