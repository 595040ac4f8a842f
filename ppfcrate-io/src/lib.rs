//! I/O operations for fragments and patch outputs
//!
//! This crate reads and writes the files the patch pipeline touches: PLY and
//! PCD point clouds (with or without normals), NPY tensors and pose matrices,
//! RGB-D depth/color images with their intrinsics and pose text files, and
//! scene manifests. Every read failure surfaces as
//! [`ppfcrate_core::Error::Load`].

pub mod error;
pub mod manifest;
pub mod npy;
pub mod pcd;
pub mod ply;
pub mod rgbd;

pub use error::*;
pub use manifest::read_scene_manifest;
pub use npy::{read_indices, read_patch, read_pose, write_indices, write_patch, write_pose};
pub use pcd::{PcdDataFormat, PcdReader, PcdWriteOptions, PcdWriter};
pub use ply::{PlyReader, PlyWriter};
pub use rgbd::{read_color_png, read_depth_png, read_intrinsics, read_pose_text, write_depth_png, DepthImage};

use ppfcrate_core::{Error, NormalPoint3f, Point3f, PointCloud, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trait for reading point clouds from files
pub trait PointCloudReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>>;
}

/// Trait for writing point clouds to files
pub trait PointCloudWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()>;
}

/// Trait for reading point clouds that carry a normal per point
pub trait OrientedCloudReader {
    fn read_oriented_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>>;
}

/// Trait for writing point clouds that carry a normal per point
pub trait OrientedCloudWriter {
    fn write_oriented_cloud<P: AsRef<Path>>(cloud: &PointCloud<NormalPoint3f>, path: P) -> Result<()>;
}

/// Point cloud file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudFormat {
    #[default]
    Pcd,
    Ply,
}

impl CloudFormat {
    pub fn extension(self) -> &'static str {
        match self {
            CloudFormat::Pcd => "pcd",
            CloudFormat::Ply => "ply",
        }
    }

    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("pcd") => Ok(CloudFormat::Pcd),
            Some("ply") => Ok(CloudFormat::Ply),
            _ => Err(Error::Unsupported(format!(
                "Unsupported point cloud format: {}",
                path.display()
            ))),
        }
    }
}

/// Auto-detect format and read point cloud
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
    let path = path.as_ref();
    match CloudFormat::from_path(path)? {
        CloudFormat::Ply => PlyReader::read_point_cloud(path),
        CloudFormat::Pcd => PcdReader::read_point_cloud(path),
    }
}

/// Auto-detect format and read an oriented point cloud
pub fn read_oriented_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>> {
    let path = path.as_ref();
    match CloudFormat::from_path(path)? {
        CloudFormat::Ply => PlyReader::read_oriented_cloud(path),
        CloudFormat::Pcd => PcdReader::read_oriented_cloud(path),
    }
}

/// Auto-detect format and write an oriented point cloud
pub fn write_oriented_cloud<P: AsRef<Path>>(cloud: &PointCloud<NormalPoint3f>, path: P) -> Result<()> {
    let path = path.as_ref();
    match CloudFormat::from_path(path)? {
        CloudFormat::Ply => PlyWriter::write_oriented_cloud(cloud, path),
        CloudFormat::Pcd => PcdWriter::write_oriented_cloud(cloud, path),
    }
}
