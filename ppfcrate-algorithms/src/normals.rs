//! Normal estimation algorithms

use crate::nearest_neighbor::SpatialIndex;
use nalgebra::{Matrix3, Vector3};
use ppfcrate_core::{
    Error, NearestNeighborSearch, NormalPoint3f, Point3f, PointCloud, Result, Vector3f,
};
use serde::{Deserialize, Serialize};

/// Normal assigned to points whose neighborhood is too small to fit a plane
pub fn default_normal() -> Vector3f {
    Vector3f::z()
}

/// Configuration for normal estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalEstimationConfig {
    /// Search radius for the local neighborhood
    pub radius: f32,
    /// Maximum number of nearest neighbors kept inside the radius
    pub max_nn: usize,
    /// Neighborhoods smaller than this fall back to [`default_normal`]
    pub min_neighbors: usize,
    /// If set, every normal is flipped to face this point
    pub viewpoint: Option<Point3f>,
}

impl Default for NormalEstimationConfig {
    fn default() -> Self {
        Self {
            radius: 0.1,
            max_nn: 30,
            min_neighbors: 3,
            viewpoint: None,
        }
    }
}

impl NormalEstimationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(Error::InvalidData(format!(
                "normal radius must be positive, got {}",
                self.radius
            )));
        }
        if self.min_neighbors < 3 {
            return Err(Error::InvalidData(
                "min_neighbors must be at least 3 to fit a plane".to_string(),
            ));
        }
        if self.max_nn < self.min_neighbors {
            return Err(Error::InvalidData(format!(
                "max_nn ({}) must not be smaller than min_neighbors ({})",
                self.max_nn, self.min_neighbors
            )));
        }
        Ok(())
    }
}

/// Estimate a unit normal for every point from the covariance of its local
/// neighborhood (hybrid search: within `radius`, at most `max_nn` nearest).
///
/// The normal is the eigenvector of the smallest covariance eigenvalue. It is
/// flipped to face `viewpoint` when one is configured, otherwise into the
/// fixed hemisphere of [`orient_to_hemisphere`].
///
/// # Errors
/// `NormalEstimation` when the cloud has fewer than `min_neighbors` points,
/// when no point has a large enough neighborhood, or when a normal comes out
/// non-finite.
pub fn estimate_normals(
    cloud: &PointCloud<Point3f>,
    config: &NormalEstimationConfig,
) -> Result<PointCloud<NormalPoint3f>> {
    config.validate()?;
    let index = SpatialIndex::new(&cloud.points);
    estimate_normals_with_index(cloud, &index, config)
}

/// Same as [`estimate_normals`] but reuses an index built over `cloud`
pub fn estimate_normals_with_index<S>(
    cloud: &PointCloud<Point3f>,
    index: &S,
    config: &NormalEstimationConfig,
) -> Result<PointCloud<NormalPoint3f>>
where
    S: NearestNeighborSearch + ?Sized,
{
    config.validate()?;
    if cloud.len() < config.min_neighbors {
        return Err(Error::NormalEstimation(format!(
            "cloud has {} points, at least {} are needed",
            cloud.len(),
            config.min_neighbors
        )));
    }
    if index.len() != cloud.len() {
        return Err(Error::InvalidData(format!(
            "index holds {} points but cloud has {}",
            index.len(),
            cloud.len()
        )));
    }

    let mut normals = Vec::with_capacity(cloud.len());
    let mut fallback_count = 0usize;

    for (i, point) in cloud.iter().enumerate() {
        let neighbors = index.find_hybrid_neighbors(point, config.radius, config.max_nn);
        if neighbors.len() < config.min_neighbors {
            fallback_count += 1;
            normals.push(default_normal());
            continue;
        }

        let normal = fit_plane_normal(cloud, &neighbors).ok_or_else(|| {
            Error::NormalEstimation(format!("degenerate neighborhood at point {}", i))
        })?;

        let normal = match config.viewpoint {
            Some(viewpoint) if normal.dot(&(viewpoint - point)) < 0.0 => -normal,
            Some(_) => normal,
            None => orient_to_hemisphere(normal),
        };
        normals.push(normal);
    }

    if fallback_count == cloud.len() {
        return Err(Error::NormalEstimation(format!(
            "no point has {} neighbors within radius {}",
            config.min_neighbors, config.radius
        )));
    }
    if fallback_count > 0 {
        log::warn!(
            "{} of {} points had too few neighbors, using default normal",
            fallback_count,
            cloud.len()
        );
    }

    cloud.with_normals(normals)
}

/// Flip `normal` so its first non-zero component among z, y, x is positive.
///
/// Eigenvector signs are arbitrary; this keeps neighboring normals on a smooth
/// surface pointing the same way when no viewpoint is configured.
pub fn orient_to_hemisphere(normal: Vector3f) -> Vector3f {
    let key = [normal.z, normal.y, normal.x]
        .into_iter()
        .find(|c| c.abs() > f32::EPSILON)
        .unwrap_or(0.0);
    if key < 0.0 {
        -normal
    } else {
        normal
    }
}

/// Smallest-eigenvalue direction of the neighborhood covariance
fn fit_plane_normal(cloud: &PointCloud<Point3f>, neighbors: &[(usize, f32)]) -> Option<Vector3f> {
    let count = neighbors.len() as f64;
    let centroid = neighbors
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, &(idx, _)| acc + cloud[idx].coords.cast::<f64>())
        / count;

    let mut covariance = Matrix3::<f64>::zeros();
    for &(idx, _) in neighbors {
        let deviation = cloud[idx].coords.cast::<f64>() - centroid;
        covariance += deviation * deviation.transpose();
    }
    covariance /= count;

    let eigen = covariance.symmetric_eigen();
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    let normal = eigen.eigenvectors.column(min_idx).into_owned().cast::<f32>();
    let normal = normal.try_normalize(f32::EPSILON)?;
    normal.iter().all(|v| v.is_finite()).then_some(normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_cloud(n: usize, spacing: f32) -> PointCloud<Point3f> {
        let mut cloud = PointCloud::new();
        for i in 0..n {
            for j in 0..n {
                cloud.push(Point3f::new(i as f32 * spacing, j as f32 * spacing, 0.0));
            }
        }
        cloud
    }

    #[test]
    fn test_planar_normals_are_vertical() {
        let cloud = plane_cloud(20, 0.02);
        let oriented = estimate_normals(&cloud, &NormalEstimationConfig::default()).unwrap();
        assert_eq!(oriented.len(), cloud.len());

        for point in oriented.iter() {
            assert!((point.normal.norm() - 1.0).abs() < 1e-5);
            assert!(point.normal.z > 0.999, "normal {:?}", point.normal);
        }
    }

    #[test]
    fn test_large_plane_normals_share_one_sign() {
        let mut cloud = PointCloud::new();
        for i in 0..100 {
            for j in 0..50 {
                cloud.push(Point3f::new(i as f32 * 0.02, j as f32 * 0.02, 0.0));
            }
        }
        let oriented = estimate_normals(&cloud, &NormalEstimationConfig::default()).unwrap();
        let flipped = oriented.iter().filter(|p| p.normal.z < 0.0).count();
        assert_eq!(flipped, 0);
    }

    #[test]
    fn test_hemisphere_tie_break() {
        assert_eq!(orient_to_hemisphere(-Vector3f::z()), Vector3f::z());
        assert_eq!(orient_to_hemisphere(Vector3f::new(0.6, -0.8, 0.0)), Vector3f::new(-0.6, 0.8, 0.0));
        assert_eq!(orient_to_hemisphere(-Vector3f::x()), Vector3f::x());
        assert_eq!(orient_to_hemisphere(Vector3f::new(0.0, 0.0, 0.5)), Vector3f::new(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_viewpoint_orientation() {
        let cloud = plane_cloud(10, 0.02);
        let config = NormalEstimationConfig {
            viewpoint: Some(Point3f::new(0.0, 0.0, -10.0)),
            ..Default::default()
        };
        let oriented = estimate_normals(&cloud, &config).unwrap();
        for point in oriented.iter() {
            assert!(point.normal.z < -0.999);
        }
    }

    #[test]
    fn test_sphere_normals_are_radial() {
        let mut cloud = PointCloud::new();
        let n = 2000;
        let golden = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
        for i in 0..n {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            cloud.push(Point3f::new(r * theta.cos(), y, r * theta.sin()));
        }

        let config = NormalEstimationConfig {
            radius: 0.2,
            ..Default::default()
        };
        let oriented = estimate_normals(&cloud, &config).unwrap();
        for point in oriented.iter() {
            let radial = point.position.coords.normalize();
            assert!(point.normal.dot(&radial).abs() > 0.95);
        }
    }

    #[test]
    fn test_isolated_points_fall_back() {
        let mut cloud = plane_cloud(10, 0.02);
        cloud.push(Point3f::new(50.0, 50.0, 50.0));
        let oriented = estimate_normals(&cloud, &NormalEstimationConfig::default()).unwrap();
        assert_eq!(oriented[cloud.len() - 1].normal, default_normal());
    }

    #[test]
    fn test_too_few_points_fails() {
        let cloud = PointCloud::from_points(vec![Point3f::origin(), Point3f::new(0.01, 0.0, 0.0)]);
        let result = estimate_normals(&cloud, &NormalEstimationConfig::default());
        assert!(matches!(result, Err(Error::NormalEstimation(_))));
    }

    #[test]
    fn test_all_isolated_fails() {
        let cloud: PointCloud<Point3f> = (0..10).map(|i| Point3f::new(i as f32 * 10.0, 0.0, 0.0)).collect();
        let result = estimate_normals(&cloud, &NormalEstimationConfig::default());
        assert!(matches!(result, Err(Error::NormalEstimation(_))));
    }

    #[test]
    fn test_invalid_config() {
        let cloud = plane_cloud(5, 0.02);
        let config = NormalEstimationConfig {
            max_nn: 2,
            ..Default::default()
        };
        assert!(matches!(estimate_normals(&cloud, &config), Err(Error::InvalidData(_))));
    }
}
