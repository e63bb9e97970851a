use std::path::PathBuf;

use pcd_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("point cloud file {path} is missing or unreadable")]
    MissingFile {
        path: PathBuf,
        #[source]
        source: las::Error,
    },

    #[error("channel '{name}' already exists with extra bytes type {found}, expected type {expected}")]
    UnsupportedAttributeType {
        name: String,
        expected: u8,
        found: u8,
    },

    #[error("malformed extra bytes description: {0}")]
    MalformedExtraBytes(String),

    #[error("channel name '{0}' does not fit in a 32-byte extra bytes descriptor")]
    ChannelNameTooLong(String),

    #[error("channel name '{0}' is reserved for a managed prediction channel")]
    ReservedChannelName(String),

    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("failed to write point cloud to {path}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AugmentError {
    pub(crate) fn write_failure<E>(path: &std::path::Path, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::WriteFailure {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}
