//! Lens distortion strategies applied on the normalized image plane

mod equidistant;
mod fisheye;
mod none;
mod radial_tangential;

pub use equidistant::EquidistantDistortion;
pub use fisheye::FisheyeDistortion;
pub use none::NoDistortion;
pub use radial_tangential::RadialTangentialDistortion;

use crate::error::DistortionError;
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use std::fmt::Debug;

type Result<T> = std::result::Result<T, DistortionError>;

const MAX_ITERATIONS: usize = 20;
const STEP_TOLERANCE: f64 = 1e-12;

/// A mapping between undistorted and distorted normalized image coordinates.
///
/// Implementations own their coefficient vector. The pinhole model is generic
/// over this trait, so each distortion kind gets its own monomorphized camera.
pub trait Distortion: Clone + Debug {
    /// Number of free coefficients.
    fn minimal_dimensions(&self) -> usize;

    /// Names of the coefficients, in the order of [`Distortion::parameters`].
    fn parameter_names(&self) -> &'static [&'static str];

    fn parameters(&self) -> DVector<f64>;

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<()>;

    /// Apply distortion to an undistorted normalized point.
    fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.distort_with_jacobian(point).0
    }

    /// Apply distortion and return the 2x2 Jacobian of the distorted point
    /// with respect to the undistorted one.
    fn distort_with_jacobian(&self, point: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>);

    /// 2xK Jacobian of the distorted point with respect to the coefficients.
    fn parameter_jacobian(&self, point: &Vector2<f64>) -> DMatrix<f64>;

    /// Remove distortion, reporting failure of the inverse solve.
    fn try_undistort(&self, distorted: &Vector2<f64>) -> Result<Vector2<f64>> {
        match newton_inverse(self, distorted) {
            (point, Convergence::Converged) => Ok(point),
            (_, Convergence::Singular) => Err(DistortionError::SingularJacobian),
            (_, Convergence::Exhausted) => Err(DistortionError::NonConvergent),
        }
    }

    /// Remove distortion. Always returns the best available estimate: when
    /// the inverse solve fails this is its last iterate, which
    /// [`Distortion::try_undistort`] reports as an error instead.
    fn undistort(&self, distorted: &Vector2<f64>) -> Vector2<f64> {
        let (point, convergence) = newton_inverse(self, distorted);
        if convergence != Convergence::Converged {
            debug!("Undistorting {distorted:?} stopped early ({convergence:?})");
        }
        point
    }

    /// Remove distortion and return the 2x2 Jacobian of the undistorted point
    /// with respect to the distorted one. The Jacobian is the identity where
    /// the forward Jacobian is singular.
    fn undistort_with_jacobian(&self, distorted: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        let point = self.undistort(distorted);
        let (_, jacobian) = self.distort_with_jacobian(&point);
        let inverse = jacobian.try_inverse().unwrap_or_else(|| {
            debug!("Singular distortion Jacobian at {point:?}, using the identity");
            Matrix2::identity()
        });
        (point, inverse)
    }

    /// Reset all coefficients to the neutral value.
    fn clear(&mut self);

    /// Exact equality of every coefficient.
    fn is_binary_equal(&self, other: &Self) -> bool;

    /// A representative, moderately distorting instance.
    fn test_distortion() -> Self
    where
        Self: Sized;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Convergence {
    Converged,
    Singular,
    Exhausted,
}

/// Newton-Raphson inversion of the forward map, seeded at the distorted point.
fn newton_inverse<D: Distortion + ?Sized>(
    distortion: &D,
    distorted: &Vector2<f64>,
) -> (Vector2<f64>, Convergence) {
    let mut point = *distorted;

    for _ in 0..MAX_ITERATIONS {
        let (estimate, jacobian) = distortion.distort_with_jacobian(&point);
        let residual = distorted - estimate;

        let Some(inverse) = jacobian.try_inverse() else {
            return (point, Convergence::Singular);
        };

        let step = inverse * residual;
        point += step;

        if step.norm_squared() < STEP_TOLERANCE * STEP_TOLERANCE {
            return (point, Convergence::Converged);
        }
    }

    (point, Convergence::Exhausted)
}

fn check_parameter_count(expected: usize, parameters: &DVector<f64>) -> Result<()> {
    if parameters.len() != expected {
        return Err(DistortionError::ParameterCount {
            expected,
            got: parameters.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Distortion;
    use nalgebra::{DMatrix, Matrix2, Vector2};

    const STEP: f64 = 1e-7;

    pub fn numeric_point_jacobian<D: Distortion>(d: &D, p: &Vector2<f64>) -> Matrix2<f64> {
        let mut jacobian = Matrix2::zeros();
        for i in 0..2 {
            let mut plus = *p;
            let mut minus = *p;
            plus[i] += STEP;
            minus[i] -= STEP;
            let column = (d.distort(&plus) - d.distort(&minus)) / (2.0 * STEP);
            jacobian.set_column(i, &column);
        }
        jacobian
    }

    pub fn numeric_parameter_jacobian<D: Distortion>(d: &D, p: &Vector2<f64>) -> DMatrix<f64> {
        let base = d.parameters();
        let mut jacobian = DMatrix::zeros(2, base.len());
        for i in 0..base.len() {
            let mut plus = d.clone();
            let mut minus = d.clone();
            let mut params = base.clone();
            params[i] += STEP;
            plus.set_parameters(&params).unwrap();
            params[i] -= 2.0 * STEP;
            minus.set_parameters(&params).unwrap();
            let column = (plus.distort(p) - minus.distort(p)) / (2.0 * STEP);
            jacobian.set_column(i, &column);
        }
        jacobian
    }

    pub fn assert_matrix_near(analytic: &DMatrix<f64>, numeric: &DMatrix<f64>, tol: f64) {
        assert_eq!(analytic.shape(), numeric.shape());
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!(
                (a - n).abs() < tol * (1.0 + n.abs()),
                "analytic {analytic} vs numeric {numeric}"
            );
        }
    }
}
