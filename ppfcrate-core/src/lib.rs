//! Core data structures and traits for ppfcrate
//!
//! This crate provides the fundamental types shared by the patch extraction
//! pipeline: points, oriented point clouds, rigid transforms, pinhole camera
//! intrinsics, the spatial search trait and the error taxonomy.

pub mod point;
pub mod point_cloud;
pub mod traits;
pub mod transform;
pub mod camera;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use traits::*;
pub use transform::*;
pub use camera::*;
pub use error::*;
