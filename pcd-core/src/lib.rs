pub mod batch;
pub mod classes;
pub mod error;
pub mod features;
pub mod probability;

pub use error::CoreError;

/// A position in the shared 3-D coordinate space of a tile.
pub type Position = [f64; 3];

/// Dense 0-based class index used for model outputs.
pub type ClassIndex = u32;

/// External classification code stored in the point-cloud file.
pub type ClassCode = u8;
