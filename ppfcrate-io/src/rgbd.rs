//! RGB-D frame inputs: depth and color images, camera intrinsics and pose text files

use crate::error::{open_file, IoError};
use image::{ImageBuffer, Luma, RgbImage};
use ppfcrate_core::{PinholeIntrinsics, Result, Transform3D};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single-channel 16-bit depth image in raw sensor units
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    /// Row-major raw depth values, zero marks a missing measurement
    pub data: Vec<u16>,
}

impl DepthImage {
    pub fn new(width: u32, height: u32, data: Vec<u16>) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(ppfcrate_core::Error::InvalidData(format!(
                "depth buffer has {} values for a {}x{} image",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, data })
    }

    #[inline]
    pub fn get(&self, u: u32, v: u32) -> u16 {
        self.data[v as usize * self.width as usize + u as usize]
    }
}

/// Read a 16-bit depth PNG
pub fn read_depth_png<P: AsRef<Path>>(path: P) -> Result<DepthImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let image = image::open(path)
        .map_err(|e| IoError::parse(path, e))?
        .into_luma16();
    let (width, height) = image.dimensions();
    DepthImage::new(width, height, image.into_raw())
}

/// Write a depth image as a 16-bit grayscale PNG
pub fn write_depth_png<P: AsRef<Path>>(path: P, depth: &DepthImage) -> Result<()> {
    let path = path.as_ref();
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(depth.width, depth.height, depth.data.clone())
            .ok_or_else(|| IoError::write(path, "depth buffer does not match its dimensions"))?;
    buffer.save(path).map_err(|e| IoError::write(path, e))?;
    Ok(())
}

/// Read an 8-bit color image
pub fn read_color_png<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(image::open(path).map_err(|e| IoError::parse(path, e))?.into_rgb8())
}

/// Read a whitespace separated numeric matrix, one row per non-empty line
fn read_matrix_text(path: &Path) -> Result<Vec<Vec<f64>>> {
    let reader = BufReader::new(open_file(path)?);
    let mut rows = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(IoError::Io)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row = trimmed
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| IoError::parse(path, format!("invalid number '{}'", v)))
            })
            .collect::<std::result::Result<Vec<f64>, IoError>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Read camera intrinsics.
///
/// Two layouts are accepted: a 3x3 camera matrix (`fx 0 cx / 0 fy cy / 0 0 1`)
/// or two lines holding `fx fy` and `cx cy`. The image size is unknown at this
/// point and left at zero; callers attach it with
/// [`PinholeIntrinsics::with_size`] once the depth image is read.
pub fn read_intrinsics<P: AsRef<Path>>(path: P) -> Result<PinholeIntrinsics> {
    let path = path.as_ref();
    let rows = read_matrix_text(path)?;
    let shape: Vec<usize> = rows.iter().map(|row| row.len()).collect();
    let (fx, fy, cx, cy) = match shape.as_slice() {
        [3, 3, 3] => (rows[0][0], rows[1][1], rows[0][2], rows[1][2]),
        [2, 2] => (rows[0][0], rows[0][1], rows[1][0], rows[1][1]),
        _ => {
            return Err(IoError::parse(
                path,
                "camera intrinsics must be a 3x3 matrix or two lines of fx fy / cx cy",
            )
            .into())
        }
    };

    PinholeIntrinsics::new(0, 0, fx as f32, fy as f32, cx as f32, cy as f32)
        .map_err(|e| IoError::parse(path, e).into())
}

/// Read a 4x4 pose matrix from a text file
pub fn read_pose_text<P: AsRef<Path>>(path: P) -> Result<Transform3D> {
    let path = path.as_ref();
    let rows = read_matrix_text(path)?;
    if rows.len() != 4 || rows.iter().any(|row| row.len() != 4) {
        return Err(IoError::parse(path, "pose must be a 4x4 matrix").into());
    }

    let values: Vec<f64> = rows.into_iter().flatten().collect();
    Transform3D::from_row_major(&values).map_err(|e| IoError::parse(path, e).into())
}
