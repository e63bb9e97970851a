use std::path::{Path, PathBuf};

use pcd_augmenter::{AugmentedTile, LasAugmenter};
use pcd_core::{features::FeatureMatrix, probability::argmax, ClassIndex, Position};

use crate::PipelineError;

/// Interpolated values for every full-resolution point of one tile, in the
/// tile's native point order.
#[derive(Debug, Clone, PartialEq)]
pub struct TileInterpolation {
    pub logits: FeatureMatrix,
    pub targets: Option<Vec<ClassIndex>>,
}

impl TileInterpolation {
    /// Share of points whose argmax class matches the propagated label.
    pub fn accuracy(&self) -> Option<f64> {
        let targets = self.targets.as_ref()?;
        if targets.is_empty() {
            return None;
        }
        let correct = self
            .logits
            .iter_rows()
            .zip(targets)
            .filter(|(row, target)| argmax(row) == Some(**target))
            .count();
        Some(correct as f64 / targets.len() as f64)
    }
}

/// Full-resolution point set a tile exposes as interpolation target.
pub trait TileTarget {
    fn positions(&self) -> &[Position];
}

/// Where tiles come from and where their results go.
pub trait TileStore {
    type Tile: TileTarget;

    fn open(&mut self, path: &Path) -> Result<Self::Tile, PipelineError>;

    /// Consumes the tile. Returns the written path, or `None` when the
    /// results were computed but not persisted.
    fn write(
        &mut self,
        tile: Self::Tile,
        interpolation: &TileInterpolation,
    ) -> Result<Option<PathBuf>, PipelineError>;
}

impl TileTarget for AugmentedTile {
    fn positions(&self) -> &[Position] {
        AugmentedTile::positions(self)
    }
}

/// LAS/LAZ tiles augmented in place and written under `output_dir` with
/// their original file name.
pub struct LasTileStore {
    augmenter: LasAugmenter,
    output_dir: Option<PathBuf>,
}

impl LasTileStore {
    pub fn new(augmenter: LasAugmenter, output_dir: Option<PathBuf>) -> Self {
        Self {
            augmenter,
            output_dir,
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }
}

impl TileStore for LasTileStore {
    type Tile = AugmentedTile;

    fn open(&mut self, path: &Path) -> Result<Self::Tile, PipelineError> {
        Ok(self.augmenter.open_for_update(path)?)
    }

    fn write(
        &mut self,
        mut tile: Self::Tile,
        interpolation: &TileInterpolation,
    ) -> Result<Option<PathBuf>, PipelineError> {
        self.augmenter.fill(&mut tile, &interpolation.logits)?;

        let Some(output_dir) = &self.output_dir else {
            log::info!(
                "no output directory configured, {:?} is not persisted",
                tile.source()
            );
            return Ok(None);
        };
        let file_name = tile
            .source()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tile.las"));
        let output_path = output_dir.join(file_name);
        Ok(Some(self.augmenter.persist(tile, &output_path)?))
    }
}
