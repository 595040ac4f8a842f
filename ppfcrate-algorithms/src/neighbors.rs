//! Radius neighbor collection around reference points

use crate::sampling::ReferenceSet;
use ppfcrate_core::{Error, NearestNeighborSearch, NormalPoint3f, PointCloud, Result};
use rand::seq::index;
use rand::Rng;

/// Indices into the source cloud forming one reference point's patch
pub type NeighborIndexSet = Vec<usize>;

/// Resample `candidates` to exactly `num_points` indices.
///
/// More candidates than needed are subsampled without replacement; otherwise
/// candidates are drawn with replacement so sparse regions still fill the
/// patch.
///
/// # Errors
/// `Sampling` if there are no candidates or `num_points` is zero.
pub fn sample_neighbor_set<R>(candidates: &[usize], num_points: usize, rng: &mut R) -> Result<NeighborIndexSet>
where
    R: Rng + ?Sized,
{
    if num_points == 0 {
        return Err(Error::Sampling("num_points_per_patch must be positive".to_string()));
    }
    if candidates.is_empty() {
        return Err(Error::Sampling("no neighbor candidates to sample from".to_string()));
    }

    if candidates.len() > num_points {
        Ok(index::sample(rng, candidates.len(), num_points)
            .into_iter()
            .map(|i| candidates[i])
            .collect())
    } else {
        Ok((0..num_points)
            .map(|_| candidates[rng.gen_range(0..candidates.len())])
            .collect())
    }
}

/// Collect one [`NeighborIndexSet`] per reference point.
///
/// `index` must be built over `source`. Every point within `vicinity` of a
/// reference point is a candidate except the reference point itself, which
/// is removed by its source index so no zero-length pair reaches the feature
/// computation. Candidates are sorted by index before resampling, making the
/// result independent of the spatial index's traversal order.
///
/// # Errors
/// `Sampling` when a reference point has no neighbor other than itself.
pub fn collect_local_neighbors<S, R>(
    reference: &ReferenceSet,
    source: &PointCloud<NormalPoint3f>,
    index: &S,
    vicinity: f32,
    num_points: usize,
    rng: &mut R,
) -> Result<Vec<NeighborIndexSet>>
where
    S: NearestNeighborSearch + ?Sized,
    R: Rng + ?Sized,
{
    if !vicinity.is_finite() || vicinity <= 0.0 {
        return Err(Error::InvalidData(format!("vicinity must be positive, got {}", vicinity)));
    }
    if index.len() != source.len() {
        return Err(Error::InvalidData(format!(
            "index holds {} points but source cloud has {}",
            index.len(),
            source.len()
        )));
    }

    let mut neighbor_sets = Vec::with_capacity(reference.len());
    for (point, &self_idx) in reference.cloud.iter().zip(&reference.indices) {
        let mut candidates: Vec<usize> = index
            .find_radius_neighbors(&point.position, vicinity)
            .into_iter()
            .map(|(idx, _)| idx)
            .filter(|&idx| idx != self_idx)
            .collect();
        candidates.sort_unstable();

        if candidates.is_empty() {
            return Err(Error::Sampling(format!(
                "reference point {} has no neighbors within {} besides itself",
                self_idx, vicinity
            )));
        }

        neighbor_sets.push(sample_neighbor_set(&candidates, num_points, rng)?);
    }

    Ok(neighbor_sets)
}
