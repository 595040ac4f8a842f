//! Reference point sampling

use ppfcrate_core::{Error, NormalPoint3f, PointCloud, Result};
use rand::seq::index;
use rand::Rng;

/// Patch centers drawn from a source cloud.
///
/// `indices[i]` is the position in the source cloud of `cloud[i]`; the pairing
/// of each point with its normal is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSet {
    pub cloud: PointCloud<NormalPoint3f>,
    pub indices: Vec<usize>,
}

impl ReferenceSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Select `num_patches` distinct points uniformly at random without
/// replacement.
///
/// All randomness comes from `rng`; pass a seeded generator for reproducible
/// output or `rand::thread_rng()` for ambient randomness.
///
/// # Errors
/// `Sampling` if `num_patches` is zero or larger than the cloud.
pub fn select_reference_points<R>(
    cloud: &PointCloud<NormalPoint3f>,
    num_patches: usize,
    rng: &mut R,
) -> Result<ReferenceSet>
where
    R: Rng + ?Sized,
{
    if num_patches == 0 {
        return Err(Error::Sampling("num_patches must be positive".to_string()));
    }
    if num_patches > cloud.len() {
        return Err(Error::Sampling(format!(
            "requested {} reference points but the cloud only has {}",
            num_patches,
            cloud.len()
        )));
    }

    let indices = index::sample(rng, cloud.len(), num_patches).into_vec();
    let reference = cloud.select(&indices)?;

    Ok(ReferenceSet {
        cloud: reference,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppfcrate_core::{Point3f, Vector3f};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn line_cloud(n: usize) -> PointCloud<NormalPoint3f> {
        (0..n)
            .map(|i| NormalPoint3f::new(Point3f::new(i as f32, 0.0, 0.0), Vector3f::new(0.0, (i % 2) as f32, 1.0).normalize()))
            .collect()
    }

    #[test]
    fn test_distinct_indices_and_pairing() {
        let cloud = line_cloud(100);
        let mut rng = StdRng::seed_from_u64(7);

        for k in [1, 10, 99, 100] {
            let reference = select_reference_points(&cloud, k, &mut rng).unwrap();
            assert_eq!(reference.len(), k);
            assert_eq!(reference.cloud.len(), k);

            let unique: HashSet<usize> = reference.indices.iter().copied().collect();
            assert_eq!(unique.len(), k);

            for (point, &idx) in reference.cloud.iter().zip(&reference.indices) {
                assert!(idx < cloud.len());
                assert_eq!(*point, cloud[idx]);
            }
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let cloud = line_cloud(1000);
        let a = select_reference_points(&cloud, 64, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = select_reference_points(&cloud, 64, &mut StdRng::seed_from_u64(42)).unwrap();
        let c = select_reference_points(&cloud, 64, &mut StdRng::seed_from_u64(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.indices, c.indices);
    }

    #[test]
    fn test_too_many_patches() {
        let cloud = line_cloud(5);
        let result = select_reference_points(&cloud, 6, &mut rand::thread_rng());
        assert!(matches!(result, Err(Error::Sampling(_))));
    }

    #[test]
    fn test_zero_patches() {
        let cloud = line_cloud(5);
        let result = select_reference_points(&cloud, 0, &mut rand::thread_rng());
        assert!(matches!(result, Err(Error::Sampling(_))));
    }
}
