//! Pipeline configuration
//!
//! Every section has defaults, so a TOML file only needs the values it
//! changes:
//!
//! ```toml
//! source = "rgbd"
//!
//! [patch]
//! num_patches = 32
//! seed = 7
//!
//! [rgbd]
//! depth_trunc = 6.0
//! ```

use crate::error::ConfigError;
use ppfcrate_algorithms::NormalEstimationConfig;
use ppfcrate_io::CloudFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Patch extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Reference points sampled per fragment
    pub num_patches: usize,
    /// Neighbors per reference point
    pub num_points_per_patch: usize,
    /// Neighbor search radius
    pub vicinity: f32,
    /// Divide the distance feature by `vicinity`
    pub normalize_distance: bool,
    /// Base seed; `None` draws fresh randomness per run
    pub seed: Option<u64>,
    pub normals: NormalEstimationConfig,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            num_patches: 2048,
            num_points_per_patch: 1024,
            vicinity: 0.3,
            normalize_distance: false,
            seed: None,
            normals: NormalEstimationConfig::default(),
        }
    }
}

impl PatchConfig {
    /// Scale applied to the distance feature
    pub fn distance_scale(&self) -> f32 {
        if self.normalize_distance {
            self.vicinity
        } else {
            1.0
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_patches == 0 {
            return Err(ConfigError::Invalid("num_patches must be positive".to_string()));
        }
        if self.num_points_per_patch == 0 {
            return Err(ConfigError::Invalid("num_points_per_patch must be positive".to_string()));
        }
        if !self.vicinity.is_finite() || self.vicinity <= 0.0 {
            return Err(ConfigError::Invalid(format!("vicinity must be positive, got {}", self.vicinity)));
        }
        self.normals
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Settings for fragments stored as fused point clouds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusedSourceConfig {
    /// Voxel edge length for downsampling, 0 disables it
    pub voxel_size: f32,
    /// Apply the per-fragment `<id>.pose.npy` transform
    pub aligned: bool,
}

impl Default for FusedSourceConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.03,
            aligned: true,
        }
    }
}

/// How a pose file relates camera and world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseConvention {
    /// The pose maps camera coordinates to world coordinates
    #[default]
    CameraToWorld,
    /// The pose is an extrinsic (world to camera) and is inverted before use
    WorldToCamera,
}

/// Settings for raw RGB-D fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbdSourceConfig {
    /// Raw depth units per metre
    pub depth_scale: f32,
    /// Depth beyond this distance (metres) is dropped
    pub depth_trunc: f32,
    /// Voxel edge length for downsampling, 0 disables it
    pub voxel_size: f32,
    pub pose_convention: PoseConvention,
    /// Intrinsics file name, looked up in the fragment directory and then its parent
    pub intrinsics_file: String,
}

impl Default for RgbdSourceConfig {
    fn default() -> Self {
        Self {
            depth_scale: 1000.0,
            depth_trunc: 10.0,
            voxel_size: 0.0,
            pose_convention: PoseConvention::CameraToWorld,
            intrinsics_file: "camera-intrinsics.txt".to_string(),
        }
    }
}

/// Which kind of fragments a scene directory holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Fused,
    Rgbd,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceKind,
    /// File format of the stored reference cloud
    pub reference_format: CloudFormat,
    pub patch: PatchConfig,
    pub fused: FusedSourceConfig,
    pub rgbd: RgbdSourceConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.patch.validate()?;
        if self.fused.voxel_size < 0.0 || self.rgbd.voxel_size < 0.0 {
            return Err(ConfigError::Invalid("voxel_size must not be negative".to_string()));
        }
        if !(self.rgbd.depth_scale > 0.0 && self.rgbd.depth_trunc > 0.0) {
            return Err(ConfigError::Invalid(
                "depth_scale and depth_trunc must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
