//! Prediction batches as delivered by the model-inference collaborator.
//!
//! A batch holds several sub-batches, one per entry of `tile_paths`. Every
//! sub-sampled point carries its sub-batch index in `batch_x`; every
//! non-sampled ground-truth point carries it in `batch_y`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{features::FeatureMatrix, ClassIndex, CoreError, Position};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawGroundTruthBatch {
    batch_y: Vec<usize>,
    positions: Vec<Vec<f64>>,
    labels: Vec<ClassIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPredictionBatch {
    tile_paths: Vec<PathBuf>,
    batch_x: Vec<usize>,
    positions: Vec<Vec<f64>>,
    logits: Vec<Vec<f32>>,
    #[serde(default)]
    targets: Option<RawGroundTruthBatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthBatch {
    pub batch_y: Vec<usize>,
    pub positions: Vec<Position>,
    pub labels: Vec<ClassIndex>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawPredictionBatch")]
pub struct PredictionBatch {
    tile_paths: Vec<PathBuf>,
    batch_x: Vec<usize>,
    positions: Vec<Position>,
    logits: FeatureMatrix,
    targets: Option<GroundTruthBatch>,
}

/// All points of one batch that belong to one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSlice {
    pub tile: PathBuf,
    pub positions: Vec<Position>,
    pub logits: FeatureMatrix,
    pub targets: Option<GroundTruthSlice>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroundTruthSlice {
    pub positions: Vec<Position>,
    pub labels: Vec<ClassIndex>,
}

fn to_positions(rows: Vec<Vec<f64>>, context: &'static str) -> Result<Vec<Position>, CoreError> {
    rows.into_iter()
        .map(|row| match row.as_slice() {
            [x, y, z] => Ok([*x, *y, *z]),
            _ => Err(CoreError::dimension_mismatch(context, 3, row.len())),
        })
        .collect()
}

fn check_sub_batch_indices(indices: &[usize], tiles: usize) -> Result<(), CoreError> {
    match indices.iter().find(|&&index| index >= tiles) {
        Some(&index) => Err(CoreError::SubBatchOutOfRange { index, tiles }),
        None => Ok(()),
    }
}

fn check_len(context: &'static str, expected: usize, found: usize) -> Result<(), CoreError> {
    if expected != found {
        return Err(CoreError::dimension_mismatch(context, expected, found));
    }
    Ok(())
}

impl TryFrom<RawPredictionBatch> for PredictionBatch {
    type Error = CoreError;

    fn try_from(raw: RawPredictionBatch) -> Result<Self, Self::Error> {
        let positions = to_positions(raw.positions, "sub-sampled position")?;
        let logits = FeatureMatrix::from_rows(&raw.logits)?;
        let targets = raw
            .targets
            .map(|targets| -> Result<GroundTruthBatch, CoreError> {
                Ok(GroundTruthBatch {
                    batch_y: targets.batch_y,
                    positions: to_positions(targets.positions, "ground-truth position")?,
                    labels: targets.labels,
                })
            })
            .transpose()?;
        PredictionBatch::new(raw.tile_paths, raw.batch_x, positions, logits, targets)
    }
}

impl PredictionBatch {
    pub fn new(
        tile_paths: Vec<PathBuf>,
        batch_x: Vec<usize>,
        positions: Vec<Position>,
        logits: FeatureMatrix,
        targets: Option<GroundTruthBatch>,
    ) -> Result<Self, CoreError> {
        check_len("batch_x length", positions.len(), batch_x.len())?;
        check_len("logit rows", positions.len(), logits.rows())?;
        check_sub_batch_indices(&batch_x, tile_paths.len())?;

        if let Some(targets) = &targets {
            check_len(
                "ground-truth batch_y length",
                targets.positions.len(),
                targets.batch_y.len(),
            )?;
            check_len(
                "ground-truth label count",
                targets.positions.len(),
                targets.labels.len(),
            )?;
            check_sub_batch_indices(&targets.batch_y, tile_paths.len())?;
        }

        Ok(Self {
            tile_paths,
            batch_x,
            positions,
            logits,
            targets,
        })
    }

    pub fn tile_paths(&self) -> &[PathBuf] {
        &self.tile_paths
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn has_targets(&self) -> bool {
        self.targets.is_some()
    }

    /// Splits the batch into one slice per sub-batch index, in index order.
    /// Point order inside a slice follows the batch order.
    pub fn into_slices(self) -> Vec<TileSlice> {
        let width = self.logits.width();
        let mut slices: Vec<TileSlice> = self
            .tile_paths
            .into_iter()
            .map(|tile| TileSlice {
                tile,
                positions: Vec::new(),
                logits: FeatureMatrix::new(width),
                targets: self.targets.as_ref().map(|_| GroundTruthSlice::default()),
            })
            .collect();

        for (point, &sub_batch) in self.batch_x.iter().enumerate() {
            let slice = &mut slices[sub_batch];
            slice.positions.push(self.positions[point]);
            slice.logits.extend_row(self.logits.row(point));
        }

        if let Some(targets) = self.targets {
            for ((&sub_batch, position), label) in targets
                .batch_y
                .iter()
                .zip(targets.positions)
                .zip(targets.labels)
            {
                if let Some(gt) = slices[sub_batch].targets.as_mut() {
                    gt.positions.push(position);
                    gt.labels.push(label);
                }
            }
        }

        slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tile_batch(with_targets: bool) -> PredictionBatch {
        let targets = with_targets.then(|| GroundTruthBatch {
            batch_y: vec![1, 0, 1],
            positions: vec![[5.0, 0.0, 0.0], [0.0, 0.0, 0.0], [6.0, 0.0, 0.0]],
            labels: vec![1, 0, 1],
        });
        PredictionBatch::new(
            vec![PathBuf::from("a.las"), PathBuf::from("b.las")],
            vec![0, 1, 0],
            vec![[0.0, 0.0, 0.0], [5.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            FeatureMatrix::from_rows(&[[1.0f32, 0.0], [0.0, 1.0], [2.0, 0.0]]).unwrap(),
            targets,
        )
        .unwrap()
    }

    #[test]
    fn slices_partition_points_by_sub_batch() {
        let slices = two_tile_batch(false).into_slices();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].tile, PathBuf::from("a.las"));
        assert_eq!(slices[0].positions, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(slices[0].logits.row(1), &[2.0, 0.0]);
        assert_eq!(slices[1].positions, vec![[5.0, 0.0, 0.0]]);
        assert!(slices[0].targets.is_none());
    }

    #[test]
    fn ground_truth_follows_batch_y() {
        let slices = two_tile_batch(true).into_slices();
        let a = slices[0].targets.as_ref().unwrap();
        let b = slices[1].targets.as_ref().unwrap();
        assert_eq!(a.labels, vec![0]);
        assert_eq!(b.labels, vec![1, 1]);
        assert_eq!(b.positions[1], [6.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_out_of_range_sub_batch() {
        let err = PredictionBatch::new(
            vec![PathBuf::from("a.las")],
            vec![0, 1],
            vec![[0.0; 3], [1.0; 3]],
            FeatureMatrix::from_rows(&[[0.0f32], [1.0]]).unwrap(),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::SubBatchOutOfRange { index: 1, tiles: 1 }
        ));
    }

    #[test]
    fn rejects_logit_count_mismatch() {
        let err = PredictionBatch::new(
            vec![PathBuf::from("a.las")],
            vec![0, 0],
            vec![[0.0; 3], [1.0; 3]],
            FeatureMatrix::from_rows(&[[0.0f32]]).unwrap(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn decodes_json_line() {
        let line = r#"{"tile_paths": ["a.las"], "batch_x": [0, 0],
            "positions": [[0, 0, 0], [1, 0, 0]], "logits": [[2.0, 0.0], [0.0, 2.0]],
            "targets": {"batch_y": [0], "positions": [[0, 0, 0]], "labels": [1]}}"#;
        let batch: PredictionBatch = serde_json::from_str(line).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.has_targets());
        assert_eq!(batch.tile_paths(), &[PathBuf::from("a.las")]);
    }

    #[test]
    fn two_dimensional_positions_are_rejected() {
        let line = r#"{"tile_paths": ["a.las"], "batch_x": [0],
            "positions": [[0, 0]], "logits": [[2.0, 0.0]]}"#;
        let err = serde_json::from_str::<PredictionBatch>(line).unwrap_err();
        assert!(err.to_string().contains("expected 3, found 2"));
    }
}
