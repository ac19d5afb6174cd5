use super::{Distortion, Result, check_parameter_count};
use crate::error::DistortionError;
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

const MIN_R: f64 = 1e-8;
const MAX_ITERATIONS: usize = 20;
const THETA_TOLERANCE: f64 = 1e-14;

/// Equidistant (Kannala-Brandt) fisheye model:
/// `theta_d = theta * (1 + k1 theta^2 + k2 theta^4 + k3 theta^6 + k4 theta^8)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EquidistantDistortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
}

impl EquidistantDistortion {
    pub fn new(k1: f64, k2: f64, k3: f64, k4: f64) -> Self {
        Self { k1, k2, k3, k4 }
    }

    /// `theta_d(theta)` and its derivative.
    fn theta_d(&self, theta: f64) -> (f64, f64) {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        let value = theta * (1.0 + self.k1 * t2 + self.k2 * t4 + self.k3 * t6 + self.k4 * t8);
        let derivative =
            1.0 + 3.0 * self.k1 * t2 + 5.0 * self.k2 * t4 + 7.0 * self.k3 * t6 + 9.0 * self.k4 * t8;
        (value, derivative)
    }

    /// Solve `theta_d(theta) = target` for theta by Newton iteration.
    fn solve_theta(&self, target: f64) -> Result<f64> {
        let mut theta = target.min(FRAC_PI_2);
        for _ in 0..MAX_ITERATIONS {
            let (value, derivative) = self.theta_d(theta);
            if derivative.abs() < f64::EPSILON {
                return Err(DistortionError::SingularJacobian);
            }
            let step = (value - target) / derivative;
            theta -= step;
            if step.abs() < THETA_TOLERANCE {
                return Ok(theta);
            }
        }
        Err(DistortionError::NonConvergent)
    }
}

impl Distortion for EquidistantDistortion {
    fn minimal_dimensions(&self) -> usize {
        4
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["k1", "k2", "k3", "k4"]
    }

    fn parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.k1, self.k2, self.k3, self.k4])
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<()> {
        check_parameter_count(4, parameters)?;
        self.k1 = parameters[0];
        self.k2 = parameters[1];
        self.k3 = parameters[2];
        self.k4 = parameters[3];
        Ok(())
    }

    fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let r = point.norm();
        if r < MIN_R {
            return *point;
        }
        let (theta_d, _) = self.theta_d(r.atan());
        point * (theta_d / r)
    }

    fn distort_with_jacobian(&self, point: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        let r = point.norm();
        if r < MIN_R {
            return (*point, Matrix2::identity());
        }
        let theta = r.atan();
        let (theta_d, dtheta_d) = self.theta_d(theta);
        let s = theta_d / r;
        let dtheta_dr = 1.0 / (1.0 + r * r);
        let ds_dr = (dtheta_d * dtheta_dr * r - theta_d) / (r * r);

        let jacobian = Matrix2::identity() * s + point * point.transpose() * (ds_dr / r);
        (point * s, jacobian)
    }

    fn parameter_jacobian(&self, point: &Vector2<f64>) -> DMatrix<f64> {
        let r = point.norm();
        if r < MIN_R {
            return DMatrix::zeros(2, 4);
        }
        let theta = r.atan();
        let t2 = theta * theta;
        let mut jacobian = DMatrix::zeros(2, 4);
        let mut power = theta * t2;
        for i in 0..4 {
            let column = point * (power / r);
            jacobian.set_column(i, &column);
            power *= t2;
        }
        jacobian
    }

    fn try_undistort(&self, distorted: &Vector2<f64>) -> Result<Vector2<f64>> {
        let rd = distorted.norm();
        if rd < MIN_R {
            return Ok(*distorted);
        }
        let theta = self.solve_theta(rd)?;
        Ok(distorted * (theta.tan() / rd))
    }

    /// Falls back to the distorted point when the theta solve fails.
    fn undistort(&self, distorted: &Vector2<f64>) -> Vector2<f64> {
        self.try_undistort(distorted).unwrap_or_else(|err| {
            debug!("Undistorting {distorted:?} failed: {err}");
            *distorted
        })
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_binary_equal(&self, other: &Self) -> bool {
        self.k1 == other.k1 && self.k2 == other.k2 && self.k3 == other.k3 && self.k4 == other.k4
    }

    fn test_distortion() -> Self {
        Self::new(-0.02, 0.003, -0.0005, 0.0001)
    }
}
