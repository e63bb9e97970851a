pub mod accumulator;
mod error;
pub mod orchestrator;
pub mod store;

pub use accumulator::{FlushRequest, TileAccumulator, TileState};
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, TileReport};
pub use store::{LasTileStore, TileInterpolation, TileStore, TileTarget};
