//! Pinhole camera model used to back-project depth images

use crate::error::{Error, Result};
use crate::point::Point3f;
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Focal length x
    pub fx: f32,
    /// Focal length y
    pub fy: f32,
    /// Principal point x
    pub cx: f32,
    /// Principal point y
    pub cy: f32,
}

impl PinholeIntrinsics {
    /// Create intrinsics, rejecting non-positive or non-finite focal lengths
    pub fn new(width: u32, height: u32, fx: f32, fy: f32, cx: f32, cy: f32) -> Result<Self> {
        if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
            return Err(Error::InvalidData(format!(
                "focal lengths must be positive, got fx={} fy={}",
                fx, fy
            )));
        }
        if !(cx.is_finite() && cy.is_finite()) {
            return Err(Error::InvalidData("principal point is not finite".to_string()));
        }

        Ok(Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
        })
    }

    /// Same focal lengths and principal point, different image size
    pub fn with_size(self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self
        }
    }

    /// Back-project pixel `(u, v)` at metric `depth` into camera coordinates
    #[inline]
    pub fn back_project(&self, u: u32, v: u32, depth: f32) -> Point3f {
        let x = (u as f32 - self.cx) * depth / self.fx;
        let y = (v as f32 - self.cy) * depth / self.fy;
        Point3f::new(x, y, depth)
    }
}
