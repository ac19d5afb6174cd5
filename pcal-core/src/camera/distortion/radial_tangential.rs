use super::{Distortion, Result, check_parameter_count};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Two radial and two tangential coefficients (plumb-bob without k3)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl RadialTangentialDistortion {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self { k1, k2, p1, p2 }
    }
}

impl Distortion for RadialTangentialDistortion {
    fn minimal_dimensions(&self) -> usize {
        4
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["k1", "k2", "p1", "p2"]
    }

    fn parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.k1, self.k2, self.p1, self.p2])
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<()> {
        check_parameter_count(4, parameters)?;
        self.k1 = parameters[0];
        self.k2 = parameters[1];
        self.p1 = parameters[2];
        self.p2 = parameters[3];
        Ok(())
    }

    fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (point.x, point.y);
        let mx2 = x * x;
        let my2 = y * y;
        let mxy = x * y;
        let rho2 = mx2 + my2;
        let radial = self.k1 * rho2 + self.k2 * rho2 * rho2;

        Vector2::new(
            x + x * radial + 2.0 * self.p1 * mxy + self.p2 * (rho2 + 2.0 * mx2),
            y + y * radial + 2.0 * self.p2 * mxy + self.p1 * (rho2 + 2.0 * my2),
        )
    }

    fn distort_with_jacobian(&self, point: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        let (x, y) = (point.x, point.y);
        let (k1, k2, p1, p2) = (self.k1, self.k2, self.p1, self.p2);
        let mx2 = x * x;
        let my2 = y * y;
        let mxy = x * y;
        let rho2 = mx2 + my2;
        let radial = k1 * rho2 + k2 * rho2 * rho2;

        let j00 = 1.0 + radial + 2.0 * k1 * mx2 + 4.0 * k2 * rho2 * mx2 + 2.0 * p1 * y + 6.0 * p2 * x;
        let j01 = 2.0 * k1 * mxy + 4.0 * k2 * rho2 * mxy + 2.0 * p1 * x + 2.0 * p2 * y;
        let j11 = 1.0 + radial + 2.0 * k1 * my2 + 4.0 * k2 * rho2 * my2 + 6.0 * p1 * y + 2.0 * p2 * x;

        (self.distort(point), Matrix2::new(j00, j01, j01, j11))
    }

    fn parameter_jacobian(&self, point: &Vector2<f64>) -> DMatrix<f64> {
        let (x, y) = (point.x, point.y);
        let rho2 = x * x + y * y;
        let rho4 = rho2 * rho2;

        DMatrix::from_row_slice(
            2,
            4,
            &[
                x * rho2, x * rho4, 2.0 * x * y, rho2 + 2.0 * x * x,
                y * rho2, y * rho4, rho2 + 2.0 * y * y, 2.0 * x * y,
            ],
        )
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_binary_equal(&self, other: &Self) -> bool {
        self.k1 == other.k1 && self.k2 == other.k2 && self.p1 == other.p1 && self.p2 == other.p2
    }

    fn test_distortion() -> Self {
        Self::new(-0.2, 0.13, 0.0005, 0.0005)
    }
}
