//! Core traits for ppfcrate

use crate::point::*;

/// Trait for spatial neighbor search over a fixed set of points.
///
/// Results are `(index, distance)` pairs where `index` refers to the point
/// set the search structure was built from. The query point itself is never
/// filtered out: if it belongs to the indexed set it is returned at distance
/// zero, and callers that need it gone must exclude it by index.
pub trait NearestNeighborSearch {
    /// Find all neighbors within a given radius, in no particular order
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;

    /// Find the `max_nn` nearest neighbors that also lie within `radius`,
    /// sorted by increasing distance
    fn find_hybrid_neighbors(&self, query: &Point3f, radius: f32, max_nn: usize) -> Vec<(usize, f32)> {
        let mut neighbors = self.find_radius_neighbors(query, radius);
        neighbors.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        neighbors.truncate(max_nn);
        neighbors
    }

    /// Number of indexed points
    fn len(&self) -> usize;

    /// Whether the index holds no points
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
