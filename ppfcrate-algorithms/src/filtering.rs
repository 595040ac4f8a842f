//! Filtering algorithms

use ppfcrate_core::{Error, Point3f, PointCloud, Result, Vector3f};
use std::collections::HashMap;

/// Voxel grid filtering
///
/// This algorithm reduces the density of a point cloud by grouping points into
/// voxels and replacing each occupied voxel with the centroid of the points it
/// contains. The grid is anchored half a voxel below the cloud's minimum
/// corner. Output order follows the first point that landed in each voxel, so
/// the result is deterministic for a given input.
///
/// Non-finite points are dropped.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `voxel_size` - Edge length of each voxel cube, must be positive
///
/// # Example
/// ```rust
/// use ppfcrate_core::{PointCloud, Point3f};
/// use ppfcrate_algorithms::voxel_grid_filter;
///
/// fn main() -> ppfcrate_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, 0.0, 0.0),
///         Point3f::new(0.01, 0.0, 0.0),
///         Point3f::new(1.0, 0.0, 0.0),
///     ]);
///
///     let filtered = voxel_grid_filter(&cloud, 0.1)?;
///     assert_eq!(filtered.len(), 2);
///     Ok(())
/// }
/// ```
pub fn voxel_grid_filter(cloud: &PointCloud<Point3f>, voxel_size: f32) -> Result<PointCloud<Point3f>> {
    if !voxel_size.is_finite() || voxel_size <= 0.0 {
        return Err(Error::InvalidData(format!(
            "voxel_size must be positive, got {}",
            voxel_size
        )));
    }

    let finite: Vec<&Point3f> = cloud
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
        .collect();
    if finite.len() < cloud.len() {
        log::warn!(
            "voxel_grid_filter: dropped {} non-finite points",
            cloud.len() - finite.len()
        );
    }
    if finite.is_empty() {
        return Ok(PointCloud::new());
    }

    let min_bound = finite.iter().fold(
        Vector3f::repeat(f32::INFINITY),
        |acc, p| acc.inf(&p.coords),
    ) - Vector3f::repeat(voxel_size * 0.5);

    let voxel_of = |point: &Point3f| -> (i64, i64, i64) {
        let rel = (point.coords - min_bound) / voxel_size;
        (rel.x.floor() as i64, rel.y.floor() as i64, rel.z.floor() as i64)
    };

    let mut slot_of_voxel: HashMap<(i64, i64, i64), usize> = HashMap::new();
    let mut sums: Vec<(Vector3f, u32)> = Vec::new();

    for point in finite {
        let slot = *slot_of_voxel.entry(voxel_of(point)).or_insert_with(|| {
            sums.push((Vector3f::zeros(), 0));
            sums.len() - 1
        });
        let (sum, count) = &mut sums[slot];
        *sum += point.coords;
        *count += 1;
    }

    Ok(sums
        .into_iter()
        .map(|(sum, count)| Point3f::from(sum / count as f32))
        .collect())
}

/// Voxel downsampling where a voxel size of zero disables the filter
pub fn voxel_downsample(cloud: &PointCloud<Point3f>, voxel_size: f32) -> Result<PointCloud<Point3f>> {
    if voxel_size == 0.0 {
        return Ok(cloud.clone());
    }
    voxel_grid_filter(cloud, voxel_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_voxel_grid_filter_empty_cloud() {
        let cloud = PointCloud::<Point3f>::new();
        let result = voxel_grid_filter(&cloud, 0.1);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().len(), 0);
    }

    #[test]
    fn test_voxel_grid_filter_single_point() {
        let cloud = PointCloud::from_points(vec![Point3f::new(0.3, -0.2, 1.0)]);
        let filtered = voxel_grid_filter(&cloud, 0.1).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_relative_eq!(filtered[0].x, 0.3);
        assert_relative_eq!(filtered[0].y, -0.2);
    }

    #[test]
    fn test_voxel_grid_filter_with_duplicates() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0), // duplicate
            Point3f::new(0.1, 0.0, 0.0),
            Point3f::new(0.1, 0.0, 0.0), // duplicate
            Point3f::new(0.0, 0.1, 0.0),
        ]);

        let filtered = voxel_grid_filter(&cloud, 0.05).unwrap();
        assert_eq!(filtered.len(), 3);
    }

    #[test]
    fn test_voxel_grid_filter_averages_voxel_members() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.02, 0.04, 0.0),
            Point3f::new(5.0, 5.0, 5.0),
        ]);

        let filtered = voxel_grid_filter(&cloud, 0.1).unwrap();
        assert_eq!(filtered.len(), 2);
        // first-seen voxel comes first
        assert_relative_eq!(filtered[0].x, 0.01, epsilon = 1e-6);
        assert_relative_eq!(filtered[0].y, 0.02, epsilon = 1e-6);
        assert_relative_eq!(filtered[1].z, 5.0);
    }

    #[test]
    fn test_voxel_grid_filter_is_deterministic() {
        let cloud: PointCloud<Point3f> = (0..500)
            .map(|i| {
                let t = i as f32 * 0.013;
                Point3f::new(t.sin(), t.cos(), t * 0.1)
            })
            .collect();

        let a = voxel_grid_filter(&cloud, 0.05).unwrap();
        let b = voxel_grid_filter(&cloud, 0.05).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_voxel_grid_filter_drops_non_finite() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(f32::NAN, 0.0, 0.0),
        ]);
        assert_eq!(voxel_grid_filter(&cloud, 0.1).unwrap().len(), 1);
    }

    #[test]
    fn test_voxel_grid_filter_invalid_voxel_size() {
        let cloud = PointCloud::from_points(vec![Point3f::new(0.0, 0.0, 0.0)]);
        assert!(voxel_grid_filter(&cloud, 0.0).is_err());
        assert!(voxel_grid_filter(&cloud, -1.0).is_err());
    }

    #[test]
    fn test_voxel_downsample_zero_disables() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
        ]);
        assert_eq!(voxel_downsample(&cloud, 0.0).unwrap(), cloud);
        assert_eq!(voxel_downsample(&cloud, 0.1).unwrap().len(), 1);
        assert!(voxel_downsample(&cloud, -0.1).is_err());
    }
}
