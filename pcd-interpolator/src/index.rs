//! R*-tree over a source point set with deterministic neighbor ordering.

use pcd_core::Position;
use rstar::{primitives::GeomWithData, RTree};

use crate::InterpolationError;

/// A source point returned by a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance_sq: f64,
}

type IndexedPoint = GeomWithData<Position, usize>;

pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    /// Bulk-loads the tree. Duplicate positions and points sharing a
    /// coordinate plane are kept as separate entries.
    pub fn build(points: &[Position]) -> Result<Self, InterpolationError> {
        if points.is_empty() {
            return Err(InterpolationError::EmptySourceSet);
        }
        let entries = points
            .iter()
            .enumerate()
            .map(|(index, &position)| GeomWithData::new(position, index))
            .collect();
        Ok(Self {
            tree: RTree::bulk_load(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns the `k` nearest source points ordered by distance, then by
    /// source index. Points tied with the k-th distance are all considered,
    /// so the lowest source indices win regardless of tree layout.
    pub fn nearest(&self, query: &Position, k: usize) -> Vec<Neighbor> {
        let k = k.min(self.len());
        if k == 0 {
            return Vec::new();
        }

        // candidates arrive in ascending distance order
        let mut neighbors: Vec<Neighbor> = Vec::with_capacity(k + 1);
        for (entry, distance_sq) in self.tree.nearest_neighbor_iter_with_distance_2(query) {
            if neighbors.len() >= k && distance_sq > neighbors[k - 1].distance_sq {
                break;
            }
            neighbors.push(Neighbor {
                index: entry.data,
                distance_sq,
            });
        }

        neighbors.sort_by(|a, b| {
            a.distance_sq
                .total_cmp(&b.distance_sq)
                .then(a.index.cmp(&b.index))
        });
        neighbors.truncate(k);
        neighbors
    }

    pub fn nearest_one(&self, query: &Position) -> Neighbor {
        // the index is never empty, so a nearest point always exists
        self.nearest(query, 1)[0]
    }
}
