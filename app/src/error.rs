use std::path::PathBuf;

use pcd_augmenter::AugmentError;
use pcd_core::CoreError;
use pcd_interpolator::InterpolationError;
use pcd_pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid class dictionary {path:?}")]
    ClassDictionary {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed prediction batch at {path:?} line {line}")]
    MalformedBatch {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid glob pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error("no batch files matched {0:?}")]
    NoBatchFiles(Vec<String>),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error(transparent)]
    Augment(#[from] AugmentError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
