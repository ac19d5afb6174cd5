//! Plane-to-image homography by normalized DLT
//!
//! `H` maps target-plane points to image points, `x' ~ H x`. Both point sets
//! are Hartley-normalized before the solve and the result is denormalized.

use crate::error::EstimationError;
use crate::linalg::{normalize_points_2d, null_vector};
use nalgebra::{DMatrix, Matrix3, Vector2};

const MIN_CORRESPONDENCES: usize = 4;

/// Estimate `H` with `image ~ H * plane`, scaled so `H[(2, 2)] == 1` when
/// that entry is not vanishing.
pub fn estimate_homography(
    plane: &[Vector2<f64>],
    image: &[Vector2<f64>],
) -> Result<Matrix3<f64>, EstimationError> {
    let n = plane.len();
    if n < MIN_CORRESPONDENCES || image.len() != n {
        return Err(EstimationError::InsufficientCorrespondences(n.min(image.len())));
    }

    let (plane_n, t_plane) = normalize_points_2d(plane).ok_or_else(|| {
        EstimationError::Degenerate("coincident plane points".to_string())
    })?;
    let (image_n, t_image) = normalize_points_2d(image).ok_or_else(|| {
        EstimationError::Degenerate("coincident image points".to_string())
    })?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pw, pi)) in plane_n.iter().zip(&image_n).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let h = null_vector(a)?;
    let h_norm = Matrix3::from_row_slice(h.as_slice());
    let t_image_inv = t_image.try_inverse().ok_or(EstimationError::SvdFailed)?;
    let mut homography = t_image_inv * h_norm * t_plane;

    let scale = homography[(2, 2)];
    if scale.abs() > f64::EPSILON {
        homography /= scale;
    }
    Ok(homography)
}

/// Map a plane point through `h`. `None` when it lands at infinity.
pub fn apply_homography(h: &Matrix3<f64>, point: &Vector2<f64>) -> Option<Vector2<f64>> {
    let mapped = h * point.push(1.0);
    if mapped.z.abs() <= f64::EPSILON {
        return None;
    }
    Some(mapped.xy() / mapped.z)
}
