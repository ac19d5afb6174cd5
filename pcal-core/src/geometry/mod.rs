//! Rigid transforms and planar helpers

pub mod circle;

pub use circle::{fit_circle, intersect_circles};

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Rigid transform taking target-frame points into the camera frame.
pub type Transformation = Isometry3<f64>;

/// Nearest rotation to `m` in the Frobenius sense, `U * V^T` with the sign of
/// the last singular direction fixed so the determinant is +1.
pub fn nearest_rotation(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return None;
    };
    if (u * v_t).determinant() < 0.0 {
        let mut last = u.column_mut(2);
        last.neg_mut();
    }
    Some(Rotation3::from_matrix_unchecked(u * v_t))
}

/// Build a [`Transformation`] from an approximately orthonormal rotation
/// matrix and a translation.
pub fn rigid_transform(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Option<Transformation> {
    let rotation = nearest_rotation(rotation)?;
    Some(Isometry3::from_parts(
        Translation3::from(*translation),
        UnitQuaternion::from_rotation_matrix(&rotation),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nearest_rotation_of_rotation_is_identity_map() {
        let r = Rotation3::from_euler_angles(0.1, -0.4, 0.7);
        let projected = nearest_rotation(r.matrix()).unwrap();
        assert_relative_eq!(*projected.matrix(), *r.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_rotation_fixes_reflection_and_scale() {
        let r = Rotation3::from_euler_angles(0.3, 0.2, -0.1);
        let noisy = r.matrix() * 1.7 + Matrix3::from_element(1e-3);
        let projected = nearest_rotation(&noisy).unwrap();
        assert_relative_eq!(projected.matrix().determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(*projected.matrix(), *r.matrix(), epsilon = 1e-2);

        let reflected = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        let projected = nearest_rotation(&reflected).unwrap();
        assert_relative_eq!(projected.matrix().determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rigid_transform_applies_rotation_then_translation() {
        let r = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let t = Vector3::new(1.0, 2.0, 3.0);
        let transform = rigid_transform(r.matrix(), &t).unwrap();
        let p = transform * nalgebra::Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(p.coords, Vector3::new(1.0, 3.0, 3.0), epsilon = 1e-12);
    }
}
