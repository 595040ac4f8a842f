//! Point cloud data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use crate::transform::Transform3D;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A generic point cloud container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with bare 3D points, as produced by loaders
pub type PointCloud3f = PointCloud<Point3f>;

/// A point cloud where every point carries its surface normal.
///
/// Only normal estimation produces this type, so a cloud whose normals have
/// not been computed can never reach the sampling stages.
pub type NormalPointCloud3f = PointCloud<NormalPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
        }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }
}

impl<T: Copy> PointCloud<T> {
    /// Build a new cloud from the points at `indices`, in the given order.
    ///
    /// Fails if any index is out of range.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let points = indices
            .iter()
            .map(|&idx| {
                self.points.get(idx).copied().ok_or_else(|| {
                    Error::InvalidData(format!(
                        "index {} out of range for cloud of {} points",
                        idx,
                        self.points.len()
                    ))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        Ok(Self { points })
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

impl PointCloud<Point3f> {
    /// Apply a transformation to all points in the cloud
    pub fn transform(&mut self, transform: &Transform3D) {
        for point in &mut self.points {
            *point = transform.transform_point(point);
        }
    }

    /// Attach normals to the points, one per point in the same order
    pub fn with_normals(&self, normals: Vec<Vector3f>) -> Result<PointCloud<NormalPoint3f>> {
        if normals.len() != self.points.len() {
            return Err(Error::InvalidData(format!(
                "{} normals supplied for {} points",
                normals.len(),
                self.points.len()
            )));
        }

        Ok(self
            .points
            .iter()
            .zip(normals)
            .map(|(&position, normal)| NormalPoint3f { position, normal })
            .collect())
    }
}

impl PointCloud<NormalPoint3f> {
    /// Apply a rigid transformation to positions and normals
    pub fn transform(&mut self, transform: &Transform3D) {
        for point in &mut self.points {
            point.position = transform.transform_point(&point.position);
            point.normal = transform.transform_vector(&point.normal);
        }
    }

    /// Positions of all points, dropping the normals
    pub fn positions(&self) -> PointCloud<Point3f> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Normals of all points, in point order
    pub fn normals(&self) -> Vec<Vector3f> {
        self.points.iter().map(|p| p.normal).collect()
    }
}
