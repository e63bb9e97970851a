pub mod augmenter;
pub mod channels;
mod error;
pub mod extra_bytes;

pub use augmenter::{AugmentedTile, LasAugmenter};
pub use channels::{ChannelType, PREDICTED_CLASSIFICATION, PROBABILITY_ENTROPY};
pub use error::AugmentError;
