use super::{Distortion, Result, check_parameter_count};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Identity distortion: the ideal pinhole
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoDistortion;

impl Distortion for NoDistortion {
    fn minimal_dimensions(&self) -> usize {
        0
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn parameters(&self) -> DVector<f64> {
        DVector::zeros(0)
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<()> {
        check_parameter_count(0, parameters)
    }

    fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        *point
    }

    fn distort_with_jacobian(&self, point: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        (*point, Matrix2::identity())
    }

    fn parameter_jacobian(&self, _point: &Vector2<f64>) -> DMatrix<f64> {
        DMatrix::zeros(2, 0)
    }

    fn try_undistort(&self, distorted: &Vector2<f64>) -> Result<Vector2<f64>> {
        Ok(*distorted)
    }

    fn undistort(&self, distorted: &Vector2<f64>) -> Vector2<f64> {
        *distorted
    }

    fn undistort_with_jacobian(&self, distorted: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        (*distorted, Matrix2::identity())
    }

    fn clear(&mut self) {}

    fn is_binary_equal(&self, _other: &Self) -> bool {
        true
    }

    fn test_distortion() -> Self {
        NoDistortion
    }
}
