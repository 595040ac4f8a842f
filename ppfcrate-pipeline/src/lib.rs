//! # ppfcrate pipeline
//!
//! Turns scene fragments into local PPF patch tensors.
//!
//! A [`GeometrySource`] loads a fragment as a point cloud, a
//! [`PatchPipeline`] runs normal estimation, reference sampling, neighbor
//! collection and feature construction on it, and a [`PatchStore`] persists
//! the result. [`PatchDataset`] exposes a scene as an indexable collection of
//! patch tensors, computed on the fly or read back from a store.
//!
//! ```no_run
//! use ppfcrate_pipeline::{open_source, PatchPipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_toml_file("ppfcrate.toml")?;
//! let source = open_source("data/7-scenes-chess", &config)?;
//! let pipeline = PatchPipeline::new(source, config.patch.clone())?;
//! let (patch, reference_indices) = pipeline.local_patches_on_the_fly("cloud_bin_0")?;
//! assert_eq!(patch.shape()[2], 4);
//! assert_eq!(reference_indices.len(), patch.shape()[0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod store;

pub use config::*;
pub use dataset::{collate, PatchBatch, PatchDataset, PatchItem};
pub use error::{ConfigError, FragmentError, Stage};
pub use pipeline::{FragmentPatches, PatchPipeline};
pub use source::{depth_to_point_cloud, open_source, FusedSource, GeometrySource, RgbdSource};
pub use store::{FilePatchStore, MemoryPatchStore, PatchStore, StoredPatches};
