use std::path::PathBuf;

use pcd_augmenter::AugmentError;
use pcd_core::CoreError;
use pcd_interpolator::InterpolationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch for tile {0} arrived after the tile was already flushed; batches of one tile must be contiguous")]
    OutOfOrderTile(PathBuf),

    #[error("failed to read prediction batches")]
    BatchSource(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error(transparent)]
    Augment(#[from] AugmentError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    pub fn batch_source<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::BatchSource(source.into())
    }
}
