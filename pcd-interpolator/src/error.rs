use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpolationError {
    #[error("cannot interpolate from an empty source point set")]
    EmptySourceSet,

    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("neighbor count must be at least 1")]
    InvalidNeighborCount,
}
