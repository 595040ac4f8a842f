//! Point pair feature (PPF) extraction
//!
//! Each (reference, neighbor) pair is described by four values, always in
//! this order:
//!
//! | column | value |
//! |--------|-------|
//! | 0 | angle between the reference normal and `d` |
//! | 1 | angle between the neighbor normal and `d` |
//! | 2 | angle between the two normals |
//! | 3 | `‖d‖`, divided by the distance scale |
//!
//! where `d = reference_point - neighbor_point`. Angles are computed as
//! `atan2(‖a × b‖, a · b) / π`, which stays accurate near 0 and π and maps
//! every angle into `[0, 1]`.

use crate::neighbors::NeighborIndexSet;
use crate::sampling::ReferenceSet;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Zip};
use ppfcrate_core::{Error, NormalPoint3f, Point3f, PointCloud, Result, Vector3f};
use std::f32::consts::PI;

/// Number of values per point pair feature
pub const PPF_DIM: usize = 4;

/// Compute the `(n, 4)` feature array between one oriented reference point
/// and `n` oriented neighbors given as `(n, 3)` position and normal arrays.
///
/// The whole neighbor batch is processed with array operations, no per-pair
/// loop. Raw distances are returned; see [`point_pair_features_scaled`] to
/// normalize them.
pub fn point_pair_features(
    ref_point: &Point3f,
    ref_normal: &Vector3f,
    points: ArrayView2<f32>,
    normals: ArrayView2<f32>,
) -> Result<Array2<f32>> {
    point_pair_features_scaled(ref_point, ref_normal, points, normals, 1.0)
}

/// [`point_pair_features`] with the distance column divided by
/// `distance_scale`
pub fn point_pair_features_scaled(
    ref_point: &Point3f,
    ref_normal: &Vector3f,
    points: ArrayView2<f32>,
    normals: ArrayView2<f32>,
    distance_scale: f32,
) -> Result<Array2<f32>> {
    if points.ncols() != 3 || normals.dim() != points.dim() {
        return Err(Error::InvalidData(format!(
            "expected matching (n, 3) point and normal arrays, got {:?} and {:?}",
            points.dim(),
            normals.dim()
        )));
    }
    if !distance_scale.is_finite() || distance_scale <= 0.0 {
        return Err(Error::InvalidData(format!(
            "distance scale must be positive, got {}",
            distance_scale
        )));
    }

    let n = points.nrows();
    let ref_point = Array1::from(vec![ref_point.x, ref_point.y, ref_point.z]);
    let ref_normal = Array1::from(vec![ref_normal.x, ref_normal.y, ref_normal.z]);
    let ref_normals = ref_normal
        .broadcast((n, 3))
        .ok_or_else(|| Error::InvalidData("cannot broadcast reference normal".to_string()))?;

    let d = &ref_point - &points;

    let angle1 = normalized_angles(ref_normals, d.view());
    let angle2 = normalized_angles(normals, d.view());
    let angle3 = normalized_angles(ref_normals, normals);
    let distance = (&d * &d).sum_axis(Axis(1)).mapv(|v| v.sqrt() / distance_scale);

    ndarray::stack(
        Axis(1),
        &[angle1.view(), angle2.view(), angle3.view(), distance.view()],
    )
    .map_err(|e| Error::InvalidData(format!("failed to assemble features: {}", e)))
}

/// Row-wise `atan2(‖a × b‖, a · b) / π` for two `(n, 3)` arrays
fn normalized_angles(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array1<f32> {
    let (ax, ay, az): (ArrayView1<f32>, _, _) = (a.column(0), a.column(1), a.column(2));
    let (bx, by, bz) = (b.column(0), b.column(1), b.column(2));

    let cx = &ay * &bz - &az * &by;
    let cy = &az * &bx - &ax * &bz;
    let cz = &ax * &by - &ay * &bx;
    let cross_norm = (&cx * &cx + &cy * &cy + &cz * &cz).mapv(f32::sqrt);
    let dot = (&a * &b).sum_axis(Axis(1));

    Zip::from(&cross_norm)
        .and(&dot)
        .map_collect(|&y, &x| y.atan2(x) / PI)
}

/// Build the `(num_reference_points, num_points_per_patch, 4)` local patch
/// tensor for a fragment.
///
/// `neighbors[i]` holds the source indices for `reference.cloud[i]`, and all
/// sets must share one length. Raw distances use a `distance_scale` of 1.
///
/// # Errors
/// `InvalidData` for mismatched or out-of-range neighbor sets, or if any
/// feature comes out non-finite.
pub fn build_local_patch(
    reference: &ReferenceSet,
    source: &PointCloud<NormalPoint3f>,
    neighbors: &[NeighborIndexSet],
    distance_scale: f32,
) -> Result<Array3<f32>> {
    if neighbors.len() != reference.len() {
        return Err(Error::InvalidData(format!(
            "{} neighbor sets for {} reference points",
            neighbors.len(),
            reference.len()
        )));
    }
    let patch_size = neighbors.first().map_or(0, |set| set.len());
    if let Some(set) = neighbors.iter().find(|set| set.len() != patch_size) {
        return Err(Error::InvalidData(format!(
            "neighbor sets must share one size, found {} and {}",
            patch_size,
            set.len()
        )));
    }
    if let Some(&idx) = neighbors.iter().flatten().find(|&&idx| idx >= source.len()) {
        return Err(Error::InvalidData(format!(
            "neighbor index {} out of bounds for cloud of {} points",
            idx,
            source.len()
        )));
    }

    let mut patch = Array3::<f32>::zeros((reference.len(), patch_size, PPF_DIM));
    for (i, (center, set)) in reference.cloud.iter().zip(neighbors).enumerate() {
        let points = Array2::from_shape_fn((patch_size, 3), |(r, c)| source[set[r]].position[c]);
        let normals = Array2::from_shape_fn((patch_size, 3), |(r, c)| source[set[r]].normal[c]);

        let features = point_pair_features_scaled(
            &center.position,
            &center.normal,
            points.view(),
            normals.view(),
            distance_scale,
        )?;
        patch.index_axis_mut(Axis(0), i).assign(&features);
    }

    if patch.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidData(
            "local patch contains non-finite features".to_string(),
        ));
    }
    Ok(patch)
}
