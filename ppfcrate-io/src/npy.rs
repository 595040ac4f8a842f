//! NPY tensor files: local patch tensors and 4x4 pose matrices

use crate::error::{create_file, open_file, IoError};
use ndarray::{Array1, Array2, Array3};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use ppfcrate_core::{Error, Result, Transform3D};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Write a `float32` tensor of shape `(num_reference_points, num_points_per_patch, 4)`
pub fn write_patch<P: AsRef<Path>>(path: P, patch: &Array3<f32>) -> Result<()> {
    let path = path.as_ref();
    let writer = BufWriter::new(create_file(path)?);
    patch.write_npy(writer).map_err(|e| IoError::write(path, e))?;
    Ok(())
}

/// Read a `float32` patch tensor written by [`write_patch`]
pub fn read_patch<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
    let path = path.as_ref();
    let reader = BufReader::new(open_file(path)?);
    Ok(Array3::<f32>::read_npy(reader).map_err(|e| IoError::parse(path, e))?)
}

/// Write point indices as a 1-D `int64` array
pub fn write_indices<P: AsRef<Path>>(path: P, indices: &[usize]) -> Result<()> {
    let path = path.as_ref();
    let array: Array1<i64> = indices.iter().map(|&i| i as i64).collect();
    let writer = BufWriter::new(create_file(path)?);
    array.write_npy(writer).map_err(|e| IoError::write(path, e))?;
    Ok(())
}

/// Read point indices written by [`write_indices`]
pub fn read_indices<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    let path = path.as_ref();
    let reader = BufReader::new(open_file(path)?);
    let array = Array1::<i64>::read_npy(reader).map_err(|e| IoError::parse(path, e))?;
    array
        .iter()
        .map(|&i| usize::try_from(i).map_err(|_| Error::from(IoError::parse(path, format!("negative index {}", i)))))
        .collect()
}

/// Read a 4x4 pose matrix stored as `float64` or `float32`
pub fn read_pose<P: AsRef<Path>>(path: P) -> Result<Transform3D> {
    let path = path.as_ref();

    let matrix = match Array2::<f64>::read_npy(BufReader::new(open_file(path)?)) {
        Ok(matrix) => matrix,
        Err(f64_err) => Array2::<f32>::read_npy(BufReader::new(open_file(path)?))
            .map(|m| m.mapv(f64::from))
            .map_err(|_| IoError::parse(path, f64_err))?,
    };

    if matrix.dim() != (4, 4) {
        return Err(IoError::parse(path, format!("expected a 4x4 pose, got {:?}", matrix.dim())).into());
    }
    let values: Vec<f64> = matrix.iter().copied().collect();
    Transform3D::from_row_major(&values).map_err(|e| IoError::parse(path, e).into())
}

/// Write a pose as a 4x4 `float64` matrix
pub fn write_pose<P: AsRef<Path>>(path: P, pose: &Transform3D) -> Result<()> {
    let path = path.as_ref();
    let matrix = Array2::from_shape_fn((4, 4), |(r, c)| pose.matrix[(r, c)] as f64);
    let writer = BufWriter::new(create_file(path)?);
    matrix.write_npy(writer).map_err(|e| IoError::write(path, e))?;
    Ok(())
}
