//! Shared routines for linear homogeneous solves

use crate::error::EstimationError;
use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Vector2, Vector3};

/// Unit vector minimizing `|A x|`, the right singular vector of the smallest
/// singular value. Under-determined systems are padded with zero rows so the
/// full right basis is available.
pub(crate) fn null_vector(a: DMatrix<f64>) -> Result<DVector<f64>, EstimationError> {
    let (rows, cols) = a.shape();
    let a = if rows < cols {
        let mut padded = DMatrix::zeros(cols, cols);
        padded.view_mut((0, 0), (rows, cols)).copy_from(&a);
        padded
    } else {
        a
    };

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(EstimationError::SvdFailed)?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.total_cmp(y))
        .map(|(i, _)| i)
        .ok_or(EstimationError::SvdFailed)?;
    Ok(v_t.row(smallest).transpose())
}

/// Hartley normalization: zero centroid, mean distance sqrt(2).
pub(crate) fn normalize_points_2d(
    points: &[Vector2<f64>],
) -> Option<(Vec<Vector2<f64>>, Matrix3<f64>)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector2<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    Some((normalized, t))
}

/// 3-D counterpart of [`normalize_points_2d`] with mean distance sqrt(3).
pub(crate) fn normalize_points_3d(
    points: &[Vector3<f64>],
) -> Option<(Vec<Vector3<f64>>, Matrix4<f64>)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector3<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = 3.0_f64.sqrt() / mean_dist;
    let mut t = Matrix4::identity() * scale;
    t[(3, 3)] = 1.0;
    t.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-centroid * scale));
    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    Some((normalized, t))
}
