mod error;
pub mod index;
pub mod interpolate;

pub use error::InterpolationError;
pub use index::{Neighbor, SpatialIndex};
pub use interpolate::{
    interpolate_features, interpolate_labels, NearestNeighborInterpolator, Weighting,
};
