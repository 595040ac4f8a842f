//! Geometry sources: turn a fragment id into a point cloud
//!
//! A scene directory holds fragments in one of two layouts:
//!
//! * fused: `<id>.ply` plus an optional `<id>.pose.npy` alignment
//! * RGB-D: `<id>.depth.png`, `<id>.color.png`, `<id>.pose.txt` and a shared
//!   `camera-intrinsics.txt`

use crate::config::{FusedSourceConfig, PipelineConfig, PoseConvention, RgbdSourceConfig, SourceKind};
use ppfcrate_algorithms::voxel_downsample;
use ppfcrate_core::{Error, PinholeIntrinsics, Point3f, PointCloud, Result, Transform3D};
use ppfcrate_io::{
    read_color_png, read_depth_png, read_intrinsics, read_pose, read_pose_text, DepthImage, PlyReader,
    PointCloudReader,
};
use std::path::{Path, PathBuf};

/// Loads fragments of one scene
pub trait GeometrySource: Send + Sync {
    /// Load the point cloud of one fragment.
    ///
    /// Missing or corrupt inputs fail with a load error; an empty cloud is
    /// never returned in their place.
    fn load_fragment(&self, fragment_id: &str) -> Result<PointCloud<Point3f>>;

    /// Ids of every fragment this source can load, sorted
    fn fragment_ids(&self) -> Result<Vec<String>>;

    /// Directory the fragments are read from
    fn root(&self) -> &Path;
}

impl<G: GeometrySource + ?Sized> GeometrySource for Box<G> {
    fn load_fragment(&self, fragment_id: &str) -> Result<PointCloud<Point3f>> {
        (**self).load_fragment(fragment_id)
    }

    fn fragment_ids(&self) -> Result<Vec<String>> {
        (**self).fragment_ids()
    }

    fn root(&self) -> &Path {
        (**self).root()
    }
}

/// Open the source matching `config.source` over `dir`
pub fn open_source(dir: impl Into<PathBuf>, config: &PipelineConfig) -> Result<Box<dyn GeometrySource>> {
    Ok(match config.source {
        SourceKind::Fused => Box::new(FusedSource::new(dir, config.fused.clone())),
        SourceKind::Rgbd => Box::new(RgbdSource::open(dir, config.rgbd.clone())?),
    })
}

/// List files in `dir` ending with `suffix` and return their ids, sorted
fn ids_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Load(format!("cannot list {}: {}", dir.display(), e)))?;

    let mut ids = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(suffix)) {
            if !id.is_empty() {
                ids.push(id.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

fn warn_if_not_rigid(fragment_id: &str, pose: &Transform3D) {
    if !pose.is_rigid(1e-3) {
        log::warn!("pose of fragment {} is not a rigid transform", fragment_id);
    }
}

/// Fragments stored as already fused point clouds
pub struct FusedSource {
    dir: PathBuf,
    config: FusedSourceConfig,
}

impl FusedSource {
    pub fn new(dir: impl Into<PathBuf>, config: FusedSourceConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }
}

impl GeometrySource for FusedSource {
    fn load_fragment(&self, fragment_id: &str) -> Result<PointCloud<Point3f>> {
        let cloud = PlyReader::read_point_cloud(self.dir.join(format!("{}.ply", fragment_id)))?;
        if cloud.is_empty() {
            return Err(Error::Load(format!("fragment {} has no points", fragment_id)));
        }

        let mut cloud = voxel_downsample(&cloud, self.config.voxel_size)?;
        if !self.config.aligned {
            return Ok(cloud);
        }

        let pose = read_pose(self.dir.join(format!("{}.pose.npy", fragment_id)))?;
        warn_if_not_rigid(fragment_id, &pose);
        cloud.transform(&pose);
        Ok(cloud)
    }

    fn fragment_ids(&self) -> Result<Vec<String>> {
        ids_with_suffix(&self.dir, ".ply")
    }

    fn root(&self) -> &Path {
        &self.dir
    }
}

/// Raw RGB-D frames back-projected through a pinhole camera
pub struct RgbdSource {
    dir: PathBuf,
    intrinsics: PinholeIntrinsics,
    config: RgbdSourceConfig,
}

impl RgbdSource {
    pub fn new(dir: impl Into<PathBuf>, intrinsics: PinholeIntrinsics, config: RgbdSourceConfig) -> Self {
        Self {
            dir: dir.into(),
            intrinsics,
            config,
        }
    }

    /// Read the intrinsics file from `dir` or, failing that, its parent
    pub fn open(dir: impl Into<PathBuf>, config: RgbdSourceConfig) -> Result<Self> {
        let dir = dir.into();
        let candidates = [
            Some(dir.join(&config.intrinsics_file)),
            dir.parent().map(|parent| parent.join(&config.intrinsics_file)),
        ];
        let path = candidates
            .into_iter()
            .flatten()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::Load(format!(
                    "no {} in {} or its parent",
                    config.intrinsics_file,
                    dir.display()
                ))
            })?;

        let intrinsics = read_intrinsics(&path)?;
        Ok(Self::new(dir, intrinsics, config))
    }

    pub fn intrinsics(&self) -> &PinholeIntrinsics {
        &self.intrinsics
    }

    /// Camera-to-world transform for a fragment
    fn camera_to_world(&self, fragment_id: &str) -> Result<Transform3D> {
        let pose = read_pose_text(self.dir.join(format!("{}.pose.txt", fragment_id)))?;
        warn_if_not_rigid(fragment_id, &pose);
        match self.config.pose_convention {
            PoseConvention::CameraToWorld => Ok(pose),
            PoseConvention::WorldToCamera => pose
                .inverse()
                .ok_or_else(|| Error::Load(format!("pose of fragment {} is not invertible", fragment_id))),
        }
    }
}

/// Back-project every valid depth pixel into world coordinates.
///
/// Zero depth marks a missing measurement; depth beyond `depth_trunc` is
/// dropped.
pub fn depth_to_point_cloud(
    depth: &DepthImage,
    intrinsics: &PinholeIntrinsics,
    camera_to_world: &Transform3D,
    depth_scale: f32,
    depth_trunc: f32,
) -> PointCloud<Point3f> {
    let mut cloud = PointCloud::new();
    for v in 0..depth.height {
        for u in 0..depth.width {
            let raw = depth.get(u, v);
            if raw == 0 {
                continue;
            }
            let z = raw as f32 / depth_scale;
            if z > depth_trunc {
                continue;
            }
            let camera_point = intrinsics.back_project(u, v, z);
            cloud.push(camera_to_world.transform_point(&camera_point));
        }
    }
    cloud
}

impl GeometrySource for RgbdSource {
    fn load_fragment(&self, fragment_id: &str) -> Result<PointCloud<Point3f>> {
        let depth = read_depth_png(self.dir.join(format!("{}.depth.png", fragment_id)))?;
        let color = read_color_png(self.dir.join(format!("{}.color.png", fragment_id)))?;
        if color.dimensions() != (depth.width, depth.height) {
            return Err(Error::Load(format!(
                "fragment {}: color image is {:?} but depth is {}x{}",
                fragment_id,
                color.dimensions(),
                depth.width,
                depth.height
            )));
        }

        let pose = self.camera_to_world(fragment_id)?;
        let intrinsics = self.intrinsics.with_size(depth.width, depth.height);
        let cloud = depth_to_point_cloud(
            &depth,
            &intrinsics,
            &pose,
            self.config.depth_scale,
            self.config.depth_trunc,
        );
        if cloud.is_empty() {
            return Err(Error::Load(format!(
                "fragment {} has no valid depth within {}",
                fragment_id, self.config.depth_trunc
            )));
        }

        voxel_downsample(&cloud, self.config.voxel_size)
    }

    fn fragment_ids(&self) -> Result<Vec<String>> {
        ids_with_suffix(&self.dir, ".depth.png")
    }

    fn root(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ppfcrate_core::Vector3f;
    use ppfcrate_io::{write_depth_png, write_pose, PlyWriter, PointCloudWriter};
    use tempfile::tempdir;

    fn write_intrinsics(dir: &Path) {
        std::fs::write(dir.join("camera-intrinsics.txt"), "2\t0\t1\n0\t2\t1\n0\t0\t1\n").unwrap();
    }

    fn write_rgbd_frame(dir: &Path, id: &str, depth: &DepthImage, pose: &str) {
        write_depth_png(dir.join(format!("{}.depth.png", id)), depth).unwrap();
        image::RgbImage::new(depth.width, depth.height)
            .save(dir.join(format!("{}.color.png", id)))
            .unwrap();
        std::fs::write(dir.join(format!("{}.pose.txt", id)), pose).unwrap();
    }

    const IDENTITY_POSE: &str = "1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n";
    const SHIFT_POSE: &str = "1 0 0 0\n0 1 0 0\n0 0 1 5\n0 0 0 1\n";

    #[test]
    fn test_fused_source_downsamples_and_aligns() {
        let dir = tempdir().unwrap();
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.001, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
        ]);
        PlyWriter::write_point_cloud(&cloud, dir.path().join("cloud_bin_0.ply")).unwrap();
        write_pose(
            dir.path().join("cloud_bin_0.pose.npy"),
            &Transform3D::translation(Vector3f::new(0.0, 0.0, 2.0)),
        )
        .unwrap();

        let source = FusedSource::new(dir.path(), FusedSourceConfig::default());
        assert_eq!(source.fragment_ids().unwrap(), vec!["cloud_bin_0"]);

        let loaded = source.load_fragment("cloud_bin_0").unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|p| (p.z - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_fused_source_unaligned_keeps_coordinates() {
        let dir = tempdir().unwrap();
        let cloud = PointCloud::from_points(vec![Point3f::new(0.5, 0.5, 0.5)]);
        PlyWriter::write_point_cloud(&cloud, dir.path().join("a.ply")).unwrap();

        let config = FusedSourceConfig {
            voxel_size: 0.0,
            aligned: false,
        };
        let source = FusedSource::new(dir.path(), config);
        assert_eq!(source.load_fragment("a").unwrap(), cloud);
    }

    #[test]
    fn test_fused_source_missing_inputs() {
        let dir = tempdir().unwrap();
        let source = FusedSource::new(dir.path(), FusedSourceConfig::default());
        assert!(matches!(source.load_fragment("missing"), Err(Error::Load(_))));

        // cloud present, pose missing
        PlyWriter::write_point_cloud(
            &PointCloud::from_points(vec![Point3f::origin()]),
            dir.path().join("b.ply"),
        )
        .unwrap();
        assert!(matches!(source.load_fragment("b"), Err(Error::Load(_))));
    }

    #[test]
    fn test_depth_to_point_cloud() {
        let intrinsics = PinholeIntrinsics::new(2, 2, 2.0, 2.0, 1.0, 1.0).unwrap();
        let depth = DepthImage::new(2, 2, vec![0, 1000, 2000, 20000]).unwrap();

        let cloud = depth_to_point_cloud(&depth, &intrinsics, &Transform3D::identity(), 1000.0, 10.0);
        // zero and truncated pixels are dropped
        assert_eq!(cloud.len(), 2);
        assert_relative_eq!(cloud[0], Point3f::new(0.0, -0.5, 1.0));
        assert_relative_eq!(cloud[1], Point3f::new(-1.0, 0.0, 2.0));
    }

    #[test]
    fn test_rgbd_source_pose_conventions() {
        let dir = tempdir().unwrap();
        let seq = dir.path().join("seq-01");
        std::fs::create_dir(&seq).unwrap();
        // intrinsics live in the scene directory above the sequence
        write_intrinsics(dir.path());

        let depth = DepthImage::new(2, 2, vec![1000; 4]).unwrap();
        write_rgbd_frame(&seq, "frame-000000", &depth, SHIFT_POSE);
        write_rgbd_frame(&seq, "frame-000001", &depth, IDENTITY_POSE);

        let source = RgbdSource::open(&seq, RgbdSourceConfig::default()).unwrap();
        assert_eq!(source.fragment_ids().unwrap(), vec!["frame-000000", "frame-000001"]);
        assert_relative_eq!(source.intrinsics().fx, 2.0);

        let cloud = source.load_fragment("frame-000000").unwrap();
        assert_eq!(cloud.len(), 4);
        assert!(cloud.iter().all(|p| (p.z - 6.0).abs() < 1e-5));

        let config = RgbdSourceConfig {
            pose_convention: PoseConvention::WorldToCamera,
            ..Default::default()
        };
        let inverted = RgbdSource::open(&seq, config).unwrap();
        let cloud = inverted.load_fragment("frame-000000").unwrap();
        assert!(cloud.iter().all(|p| (p.z + 4.0).abs() < 1e-5));
    }

    #[test]
    fn test_rgbd_source_failures() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            RgbdSource::open(dir.path(), RgbdSourceConfig::default()),
            Err(Error::Load(_))
        ));

        write_intrinsics(dir.path());
        let source = RgbdSource::open(dir.path(), RgbdSourceConfig::default()).unwrap();

        // depth present but every pixel missing
        let empty = DepthImage::new(2, 2, vec![0; 4]).unwrap();
        write_rgbd_frame(dir.path(), "empty", &empty, IDENTITY_POSE);
        assert!(matches!(source.load_fragment("empty"), Err(Error::Load(_))));

        // pose file missing
        let depth = DepthImage::new(2, 2, vec![500; 4]).unwrap();
        write_rgbd_frame(dir.path(), "nopose", &depth, IDENTITY_POSE);
        std::fs::remove_file(dir.path().join("nopose.pose.txt")).unwrap();
        assert!(matches!(source.load_fragment("nopose"), Err(Error::Load(_))));

        // color size does not match depth
        write_rgbd_frame(dir.path(), "mismatch", &depth, IDENTITY_POSE);
        image::RgbImage::new(3, 2)
            .save(dir.path().join("mismatch.color.png"))
            .unwrap();
        assert!(matches!(source.load_fragment("mismatch"), Err(Error::Load(_))));
    }
}
