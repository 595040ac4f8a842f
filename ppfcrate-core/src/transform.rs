//! 3D rigid transformation utilities

use crate::error::{Error, Result};
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 4x4 homogeneous transformation applied to points and point clouds.
///
/// Fragment poses are stored this way; for those the upper-left 3x3 block is a
/// rotation and the last row is `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub matrix: Matrix4<f32>,
}

impl Transform3D {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Create a translation transformation
    pub fn translation(translation: Vector3<f32>) -> Self {
        Self {
            matrix: Matrix4::new_translation(&translation),
        }
    }

    /// Build a transform from 16 values in row-major order, as stored in
    /// pose text files and numpy arrays.
    pub fn from_row_major(values: &[f64]) -> Result<Self> {
        if values.len() != 16 {
            return Err(Error::InvalidData(format!(
                "a 4x4 transform needs 16 values, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData("transform contains non-finite values".to_string()));
        }

        let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        Ok(Self {
            matrix: Matrix4::from_row_slice(&values),
        })
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        let homogeneous = self.matrix * point.to_homogeneous();
        Point3::from_homogeneous(homogeneous).unwrap_or(*point)
    }

    /// Apply the rotational part of the transformation to a vector
    pub fn transform_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.rotation() * vector
    }

    /// Upper-left 3x3 block
    pub fn rotation(&self) -> Matrix3<f32> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Get the inverse transformation
    pub fn inverse(self) -> Option<Self> {
        self.matrix.try_inverse().map(|inv_matrix| Self {
            matrix: inv_matrix,
        })
    }

    /// Check whether the matrix is a rigid motion: orthonormal rotation with
    /// determinant +1 and an affine last row.
    pub fn is_rigid(&self, epsilon: f32) -> bool {
        let rotation = self.rotation();
        let orthonormal = (rotation * rotation.transpose() - Matrix3::identity()).norm() < epsilon;
        let proper = (rotation.determinant() - 1.0).abs() < epsilon;
        let last_row = self.matrix.row(3);
        let affine = last_row[0].abs() < epsilon
            && last_row[1].abs() < epsilon
            && last_row[2].abs() < epsilon
            && (last_row[3] - 1.0).abs() < epsilon;
        orthonormal && proper && affine
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Matrix4<f32>> for Transform3D {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_row_major_translation() {
        let values = [
            1.0, 0.0, 0.0, 1.0,
            0.0, 1.0, 0.0, 2.0,
            0.0, 0.0, 1.0, 3.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let transform = Transform3D::from_row_major(&values).unwrap();
        let moved = transform.transform_point(&Point3::origin());
        assert_relative_eq!(moved.x, 1.0);
        assert_relative_eq!(moved.y, 2.0);
        assert_relative_eq!(moved.z, 3.0);
        assert!(transform.is_rigid(1e-5));

        // vectors ignore translation
        let v = transform.transform_vector(&Vector3::z());
        assert_relative_eq!(v.z, 1.0);
        assert_relative_eq!(v.x, 0.0);
    }

    #[test]
    fn test_from_row_major_rejects_bad_input() {
        assert!(Transform3D::from_row_major(&[1.0; 15]).is_err());
        let mut values = [0.0; 16];
        values[0] = f64::NAN;
        assert!(Transform3D::from_row_major(&values).is_err());
    }

    #[test]
    fn test_inverse_roundtrip() {
        let transform = Transform3D::translation(Vector3::new(0.5, -1.0, 2.0));
        let inverse = transform.inverse().unwrap();
        let p = Point3::new(0.25, 4.0, -3.0);
        assert_relative_eq!(inverse.transform_point(&transform.transform_point(&p)), p, epsilon = 1e-6);
    }

    #[test]
    fn test_scaling_is_not_rigid() {
        let scaling = Transform3D::from(Matrix4::new_scaling(2.0));
        assert!(!scaling.is_rigid(1e-5));
    }
}
