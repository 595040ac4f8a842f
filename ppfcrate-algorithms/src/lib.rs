//! # ppfcrate Algorithms
//!
//! Geometric preprocessing for local patch extraction.
//!
//! The stages run in this order: voxel filtering, normal estimation,
//! reference point sampling, radius neighbor collection and point pair
//! feature construction. Every sampling step takes an explicit random
//! generator so a seeded run is reproducible.

pub mod filtering;
pub mod normals;
pub mod nearest_neighbor;
pub mod sampling;
pub mod neighbors;
pub mod features;

// Re-export commonly used items
pub use filtering::*;
pub use normals::*;
pub use nearest_neighbor::*;
pub use sampling::*;
pub use neighbors::*;
pub use features::*;
