use super::{Distortion, Result, check_parameter_count};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};

// Below this field of view the model is treated as the identity.
const MIN_W2: f64 = 1e-5;
// Radius under which the small-angle limit of the scale factor is used.
const MIN_R2: f64 = 1e-10;

/// Field-of-view fisheye model (Devernay & Faugeras) with a single
/// coefficient `w`, the half-width of the lens field of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FisheyeDistortion {
    pub w: f64,
}

impl FisheyeDistortion {
    pub fn new(w: f64) -> Self {
        Self { w }
    }

    fn is_identity(&self) -> bool {
        self.w * self.w < MIN_W2
    }

    /// Radial scale factor `rd / r` and its derivative with respect to `r`.
    fn scale(&self, r: f64) -> (f64, f64) {
        let w = self.w;
        let t2 = 2.0 * (0.5 * w).tan();
        if r * r < MIN_R2 {
            return (t2 / w, 0.0);
        }
        let a = (r * t2).atan();
        let s = a / (w * r);
        let da_dr = t2 / (1.0 + r * r * t2 * t2);
        let ds_dr = (da_dr * r - a) / (w * r * r);
        (s, ds_dr)
    }
}

impl Distortion for FisheyeDistortion {
    fn minimal_dimensions(&self) -> usize {
        1
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["w"]
    }

    fn parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.w])
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<()> {
        check_parameter_count(1, parameters)?;
        self.w = parameters[0];
        Ok(())
    }

    fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        if self.is_identity() {
            return *point;
        }
        point * self.scale(point.norm()).0
    }

    fn distort_with_jacobian(&self, point: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        if self.is_identity() {
            return (*point, Matrix2::identity());
        }
        let r = point.norm();
        let (s, ds_dr) = self.scale(r);
        let mut jacobian = Matrix2::identity() * s;
        if r * r >= MIN_R2 {
            jacobian += point * point.transpose() * (ds_dr / r);
        }
        (point * s, jacobian)
    }

    fn parameter_jacobian(&self, point: &Vector2<f64>) -> DMatrix<f64> {
        let w = self.w;
        if self.is_identity() {
            return DMatrix::zeros(2, 1);
        }
        let t = (0.5 * w).tan();
        let dt_dw = 0.5 * (1.0 + t * t);
        let r = point.norm();

        let ds_dw = if r * r < MIN_R2 {
            (2.0 * dt_dw * w - 2.0 * t) / (w * w)
        } else {
            let a = (2.0 * r * t).atan();
            let da_dw = 2.0 * r * dt_dw / (1.0 + 4.0 * r * r * t * t);
            (da_dw * w - a) / (w * w * r)
        };

        DMatrix::from_column_slice(2, 1, &[point.x * ds_dw, point.y * ds_dw])
    }

    fn try_undistort(&self, distorted: &Vector2<f64>) -> Result<Vector2<f64>> {
        Ok(self.undistort(distorted))
    }

    fn undistort(&self, distorted: &Vector2<f64>) -> Vector2<f64> {
        if self.is_identity() {
            return *distorted;
        }
        let w = self.w;
        let t2 = 2.0 * (0.5 * w).tan();
        let rd = distorted.norm();
        let factor = if rd * rd < MIN_R2 {
            w / t2
        } else {
            (rd * w).tan() / (t2 * rd)
        };
        distorted * factor
    }

    fn clear(&mut self) {
        self.w = 0.0;
    }

    fn is_binary_equal(&self, other: &Self) -> bool {
        self.w == other.w
    }

    fn test_distortion() -> Self {
        Self::new(0.9)
    }
}
