use pcd_core::{features::FeatureMatrix, ClassIndex, Position};
use rayon::prelude::*;

use crate::{index::SpatialIndex, InterpolationError, Neighbor};

/// Squared distances below this are clamped before weighting.
const MIN_DISTANCE_SQ: f64 = 1e-16;

/// How the features of k > 1 neighbors are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    #[default]
    InverseSquaredDistance,
    Uniform,
}

#[derive(Debug, Clone, Copy)]
pub struct NearestNeighborInterpolator {
    k: usize,
    weighting: Weighting,
}

impl Default for NearestNeighborInterpolator {
    fn default() -> Self {
        Self {
            k: 1,
            weighting: Weighting::default(),
        }
    }
}

fn check_source_len(
    context: &'static str,
    positions: usize,
    values: usize,
) -> Result<(), InterpolationError> {
    if positions == 0 {
        return Err(InterpolationError::EmptySourceSet);
    }
    if positions != values {
        return Err(InterpolationError::DimensionMismatch {
            context,
            expected: positions,
            found: values,
        });
    }
    Ok(())
}

impl NearestNeighborInterpolator {
    pub fn new(k: usize, weighting: Weighting) -> Result<Self, InterpolationError> {
        if k == 0 {
            return Err(InterpolationError::InvalidNeighborCount);
        }
        Ok(Self { k, weighting })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Assigns every target point the aggregated features of its k nearest
    /// source points. Output rows follow the target order.
    pub fn interpolate_features(
        &self,
        source_positions: &[Position],
        source_features: &FeatureMatrix,
        target_positions: &[Position],
    ) -> Result<FeatureMatrix, InterpolationError> {
        check_source_len(
            "source feature rows",
            source_positions.len(),
            source_features.rows(),
        )?;

        let index = SpatialIndex::build(source_positions)?;
        let width = source_features.width();
        log::debug!(
            "interpolating {} features from {} source points onto {} targets (k={})",
            width,
            source_positions.len(),
            target_positions.len(),
            self.k
        );

        let mut output = FeatureMatrix::zeros(width, target_positions.len());
        if width == 0 {
            return Ok(output);
        }
        output
            .as_mut_slice()
            .par_chunks_mut(width)
            .zip(target_positions.par_iter())
            .for_each(|(row, target)| {
                let neighbors = index.nearest(target, self.k);
                self.aggregate(&neighbors, source_features, row);
            });

        Ok(output)
    }

    fn aggregate(&self, neighbors: &[Neighbor], features: &FeatureMatrix, out: &mut [f32]) {
        if let [single] = neighbors {
            out.copy_from_slice(features.row(single.index));
            return;
        }

        let mut sums = vec![0.0f64; out.len()];
        let mut total_weight = 0.0f64;
        for neighbor in neighbors {
            let weight = match self.weighting {
                Weighting::InverseSquaredDistance => {
                    1.0 / neighbor.distance_sq.max(MIN_DISTANCE_SQ)
                }
                Weighting::Uniform => 1.0,
            };
            total_weight += weight;
            for (sum, &value) in sums.iter_mut().zip(features.row(neighbor.index)) {
                *sum += weight * value as f64;
            }
        }
        for (value, sum) in out.iter_mut().zip(sums) {
            *value = (sum / total_weight) as f32;
        }
    }
}

/// k-nearest feature interpolation with inverse squared distance weighting.
pub fn interpolate_features(
    source_positions: &[Position],
    source_features: &FeatureMatrix,
    target_positions: &[Position],
    k: usize,
) -> Result<FeatureMatrix, InterpolationError> {
    NearestNeighborInterpolator::new(k, Weighting::InverseSquaredDistance)?.interpolate_features(
        source_positions,
        source_features,
        target_positions,
    )
}

/// Strict 1-nearest-neighbor propagation of categorical labels.
pub fn interpolate_labels(
    source_positions: &[Position],
    source_labels: &[ClassIndex],
    target_positions: &[Position],
) -> Result<Vec<ClassIndex>, InterpolationError> {
    check_source_len(
        "source label count",
        source_positions.len(),
        source_labels.len(),
    )?;

    let index = SpatialIndex::build(source_positions)?;
    Ok(target_positions
        .par_iter()
        .map(|target| source_labels[index.nearest_one(target).index])
        .collect())
}
