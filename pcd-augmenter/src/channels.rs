//! Per-point channels appended to augmented tiles.

/// Extra bytes channel holding the external class code of the argmax class.
pub const PREDICTED_CLASSIFICATION: &str = "PredictedClassification";

/// Extra bytes channel holding the Shannon entropy (nats) of the probabilities.
pub const PROBABILITY_ENTROPY: &str = "entropy";

/// Value types written by the augmenter, with their LAS extra bytes type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Int64,
    Float64,
}

impl ChannelType {
    pub fn data_type(self) -> u8 {
        match self {
            ChannelType::Int64 => 8,
            ChannelType::Float64 => 10,
        }
    }

    pub fn size(self) -> usize {
        8
    }
}

/// A channel the augmenter manages, resolved to its byte offset in the
/// per-point extra bytes once a tile is opened.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChannelSpec {
    pub name: String,
    pub channel_type: ChannelType,
    pub description: &'static str,
}

impl ChannelSpec {
    pub fn new(name: &str, channel_type: ChannelType, description: &'static str) -> Self {
        Self {
            name: name.to_string(),
            channel_type,
            description,
        }
    }
}
