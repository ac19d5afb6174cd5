use super::{CameraModel, Keypoint, distortion::Distortion, distortion::NoDistortion};
use crate::error::{CameraError, Result};
use nalgebra::{
    DMatrix, DVector, Matrix2, Matrix2x3, Matrix2x4, Matrix3x2, Matrix4x2, SMatrix, Vector2,
    Vector3, Vector4,
};
use rand::Rng;

/// Eight homogeneous border directions, one per column.
pub type BorderRays = SMatrix<f64, 4, 8>;

/// Pinhole camera model over a pluggable distortion strategy.
///
/// Pixel coordinates are `u = fu * d(x/z) + cu`, `v = fv * d(y/z) + cv` where
/// `d` is the distortion map. A keypoint is inside the image when
/// `0 <= u < width` and `0 <= v < height`.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeProjection<D = NoDistortion> {
    width: usize,
    height: usize,
    fu: f64,
    fv: f64,
    cu: f64,
    cv: f64,
    recip_fu: f64,
    recip_fv: f64,
    fu_over_fv: f64,
    distortion: D,
}

impl PinholeProjection<NoDistortion> {
    /// Create a new pinhole camera with no distortion
    pub fn new_ideal(width: usize, height: usize, fu: f64, fv: f64, cu: f64, cv: f64) -> Self {
        Self::new(width, height, fu, fv, cu, cv, NoDistortion)
    }
}

impl<D: Distortion> PinholeProjection<D> {
    pub const KEYPOINT_DIMENSION: usize = 2;
    pub const INTRINSICS_DIMENSION: usize = 4;

    pub fn new(
        width: usize,
        height: usize,
        fu: f64,
        fv: f64,
        cu: f64,
        cv: f64,
        distortion: D,
    ) -> Self {
        let mut camera = Self {
            width,
            height,
            fu,
            fv,
            cu,
            cv,
            recip_fu: 0.0,
            recip_fv: 0.0,
            fu_over_fv: 0.0,
            distortion,
        };
        camera.update_temporaries();
        camera
    }

    /// Like [`PinholeProjection::new`], rejecting zero or non-finite intrinsics.
    pub fn try_new(
        width: usize,
        height: usize,
        fu: f64,
        fv: f64,
        cu: f64,
        cv: f64,
        distortion: D,
    ) -> Result<Self> {
        if ![fu, fv, cu, cv].iter().all(|value| value.is_finite()) {
            return Err(CameraError::Numerical(format!(
                "non-finite intrinsics: fu={fu}, fv={fv}, cu={cu}, cv={cv}"
            )));
        }
        if fu == 0.0 || fv == 0.0 {
            return Err(CameraError::InvalidInput(
                "focal lengths must be nonzero".to_string(),
            ));
        }
        Ok(Self::new(width, height, fu, fv, cu, cv, distortion))
    }

    /// The fixture used throughout the tests: 640x480, f = 400, centered.
    pub fn test_projection() -> Self {
        Self::new(640, 480, 400.0, 400.0, 320.0, 240.0, D::test_distortion())
    }

    pub fn fu(&self) -> f64 {
        self.fu
    }

    pub fn fv(&self) -> f64 {
        self.fv
    }

    pub fn cu(&self) -> f64 {
        self.cu
    }

    pub fn cv(&self) -> f64 {
        self.cv
    }

    /// Get focal lengths
    pub fn focal_length(&self) -> (f64, f64) {
        (self.fu, self.fv)
    }

    /// Get principal point
    pub fn principal_point(&self) -> (f64, f64) {
        (self.cu, self.cv)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn recip_fu(&self) -> f64 {
        self.recip_fu
    }

    pub fn recip_fv(&self) -> f64 {
        self.recip_fv
    }

    pub fn fu_over_fv(&self) -> f64 {
        self.fu_over_fv
    }

    pub fn distortion(&self) -> &D {
        &self.distortion
    }

    pub fn distortion_mut(&mut self) -> &mut D {
        &mut self.distortion
    }

    pub fn set_distortion_parameters(&mut self, parameters: &DVector<f64>) -> Result<()> {
        self.distortion.set_parameters(parameters)?;
        Ok(())
    }

    pub fn clear_distortion(&mut self) {
        self.distortion.clear();
    }

    pub fn set_focal_lengths(&mut self, fu: f64, fv: f64) {
        self.fu = fu;
        self.fv = fv;
        self.update_temporaries();
    }

    pub fn set_principal_point(&mut self, cu: f64, cv: f64) {
        self.cu = cu;
        self.cv = cv;
    }

    pub fn set_resolution(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }

    fn update_temporaries(&mut self) {
        self.recip_fu = 1.0 / self.fu;
        self.recip_fv = 1.0 / self.fv;
        self.fu_over_fv = self.fu / self.fv;
    }

    fn to_pixel(&self, distorted: &Vector2<f64>) -> Keypoint {
        Vector2::new(
            self.fu * distorted.x + self.cu,
            self.fv * distorted.y + self.cv,
        )
    }

    fn to_normalized(&self, keypoint: &Keypoint) -> Vector2<f64> {
        Vector2::new(
            (keypoint.x - self.cu) * self.recip_fu,
            (keypoint.y - self.cv) * self.recip_fv,
        )
    }

    /// Project a camera-frame point. The flag is false when the point has
    /// non-positive depth or lands outside the image.
    pub fn euclidean_to_keypoint(&self, point: &Vector3<f64>) -> (Keypoint, bool) {
        let rz = 1.0 / point.z;
        let normalized = Vector2::new(point.x * rz, point.y * rz);
        let keypoint = self.to_pixel(&self.distortion.distort(&normalized));
        (keypoint, self.is_inside_image(&keypoint) && point.z > 0.0)
    }

    /// Project a camera-frame point together with the 2x3 Jacobian of the
    /// keypoint with respect to the point.
    pub fn euclidean_to_keypoint_with_jacobian(
        &self,
        point: &Vector3<f64>,
    ) -> (Keypoint, Matrix2x3<f64>, bool) {
        let rz = 1.0 / point.z;
        let rz2 = rz * rz;
        let normalized = Vector2::new(point.x * rz, point.y * rz);
        let (distorted, jd) = self.distortion.distort_with_jacobian(&normalized);

        let (x, y) = (point.x, point.y);
        let jacobian = Matrix2x3::new(
            self.fu * jd[(0, 0)] * rz,
            self.fu * jd[(0, 1)] * rz,
            -self.fu * (x * jd[(0, 0)] + y * jd[(0, 1)]) * rz2,
            self.fv * jd[(1, 0)] * rz,
            self.fv * jd[(1, 1)] * rz,
            -self.fv * (x * jd[(1, 0)] + y * jd[(1, 1)]) * rz2,
        );

        let keypoint = self.to_pixel(&distorted);
        (
            keypoint,
            jacobian,
            self.is_inside_image(&keypoint) && point.z > 0.0,
        )
    }

    /// Project a homogeneous point. A negative `w` only flips the sign of all
    /// four components before use.
    pub fn homogeneous_to_keypoint(&self, point: &Vector4<f64>) -> (Keypoint, bool) {
        let (euclidean, _) = normalize_homogeneous(point);
        self.euclidean_to_keypoint(&euclidean)
    }

    /// The Jacobian is the euclidean one in the first three columns with a
    /// zero last column, negated when `w < 0`.
    pub fn homogeneous_to_keypoint_with_jacobian(
        &self,
        point: &Vector4<f64>,
    ) -> (Keypoint, Matrix2x4<f64>, bool) {
        let (euclidean, sign) = normalize_homogeneous(point);
        let (keypoint, je, valid) = self.euclidean_to_keypoint_with_jacobian(&euclidean);

        let mut jacobian = Matrix2x4::zeros();
        jacobian.fixed_view_mut::<2, 3>(0, 0).copy_from(&(je * sign));
        (keypoint, jacobian, valid)
    }

    /// Back-project a keypoint to a ray with unit depth. The flag reports
    /// whether the keypoint lies inside the image.
    pub fn keypoint_to_euclidean(&self, keypoint: &Keypoint) -> (Vector3<f64>, bool) {
        let undistorted = self.distortion.undistort(&self.to_normalized(keypoint));
        (
            Vector3::new(undistorted.x, undistorted.y, 1.0),
            self.is_inside_image(keypoint),
        )
    }

    /// Back-project with the 3x2 Jacobian of the ray with respect to the
    /// keypoint. The last row is zero since depth is fixed to one.
    pub fn keypoint_to_euclidean_with_jacobian(
        &self,
        keypoint: &Keypoint,
    ) -> (Vector3<f64>, Matrix3x2<f64>, bool) {
        let (undistorted, ju) = self
            .distortion
            .undistort_with_jacobian(&self.to_normalized(keypoint));

        let scaling = Matrix2::new(self.recip_fu, 0.0, 0.0, self.recip_fv);
        let mut jacobian = Matrix3x2::zeros();
        jacobian
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&(ju * scaling));

        (
            Vector3::new(undistorted.x, undistorted.y, 1.0),
            jacobian,
            self.is_inside_image(keypoint),
        )
    }

    /// Back-project to a direction at infinity (`w = 0`).
    pub fn keypoint_to_homogeneous(&self, keypoint: &Keypoint) -> (Vector4<f64>, bool) {
        let (ray, valid) = self.keypoint_to_euclidean(keypoint);
        (ray.push(0.0), valid)
    }

    pub fn keypoint_to_homogeneous_with_jacobian(
        &self,
        keypoint: &Keypoint,
    ) -> (Vector4<f64>, Matrix4x2<f64>, bool) {
        let (ray, je, valid) = self.keypoint_to_euclidean_with_jacobian(keypoint);
        let mut jacobian = Matrix4x2::zeros();
        jacobian.fixed_view_mut::<3, 2>(0, 0).copy_from(&je);
        (ray.push(0.0), jacobian, valid)
    }

    /// Jacobian of the keypoint with respect to `[fu, fv, cu, cv]`.
    pub fn euclidean_to_keypoint_intrinsics_jacobian(&self, point: &Vector3<f64>) -> Matrix2x4<f64> {
        let rz = 1.0 / point.z;
        let distorted = self
            .distortion
            .distort(&Vector2::new(point.x * rz, point.y * rz));

        let mut jacobian = Matrix2x4::zeros();
        jacobian[(0, 0)] = distorted.x;
        jacobian[(0, 2)] = 1.0;
        jacobian[(1, 1)] = distorted.y;
        jacobian[(1, 3)] = 1.0;
        jacobian
    }

    /// 2xK Jacobian of the keypoint with respect to the distortion coefficients.
    pub fn euclidean_to_keypoint_distortion_jacobian(&self, point: &Vector3<f64>) -> DMatrix<f64> {
        let rz = 1.0 / point.z;
        let mut jacobian = self
            .distortion
            .parameter_jacobian(&Vector2::new(point.x * rz, point.y * rz));
        jacobian.row_mut(0).scale_mut(self.fu);
        jacobian.row_mut(1).scale_mut(self.fv);
        jacobian
    }

    pub fn homogeneous_to_keypoint_intrinsics_jacobian(
        &self,
        point: &Vector4<f64>,
    ) -> Matrix2x4<f64> {
        let (euclidean, _) = normalize_homogeneous(point);
        self.euclidean_to_keypoint_intrinsics_jacobian(&euclidean)
    }

    pub fn homogeneous_to_keypoint_distortion_jacobian(&self, point: &Vector4<f64>) -> DMatrix<f64> {
        let (euclidean, _) = normalize_homogeneous(point);
        self.euclidean_to_keypoint_distortion_jacobian(&euclidean)
    }

    /// Half-open bounds test on both axes.
    pub fn is_inside_image(&self, keypoint: &Keypoint) -> bool {
        keypoint.x >= 0.0
            && keypoint.y >= 0.0
            && keypoint.x < self.width as f64
            && keypoint.y < self.height as f64
    }

    pub fn is_euclidean_visible(&self, point: &Vector3<f64>) -> bool {
        self.euclidean_to_keypoint(point).1
    }

    pub fn is_homogeneous_visible(&self, point: &Vector4<f64>) -> bool {
        self.homogeneous_to_keypoint(point).1
    }

    pub fn minimal_dimensions(&self) -> usize {
        Self::INTRINSICS_DIMENSION
    }

    /// Additive update of `[fu, fv, cu, cv]`.
    pub fn update(&mut self, delta: &Vector4<f64>) {
        self.fu += delta[0];
        self.fv += delta[1];
        self.cu += delta[2];
        self.cv += delta[3];
        self.update_temporaries();
    }

    /// Intrinsics as `[fu, fv, cu, cv]`.
    pub fn parameters(&self) -> Vector4<f64> {
        Vector4::new(self.fu, self.fv, self.cu, self.cv)
    }

    pub fn set_parameters(&mut self, parameters: &Vector4<f64>) {
        self.fu = parameters[0];
        self.fv = parameters[1];
        self.cu = parameters[2];
        self.cv = parameters[3];
        self.update_temporaries();
    }

    /// Rescale for imagery resampled by `scale`. Resolution is truncated to
    /// whole pixels.
    pub fn resize_intrinsics(&mut self, scale: f64) {
        self.fu *= scale;
        self.fv *= scale;
        self.cu *= scale;
        self.cv *= scale;
        self.width = (self.width as f64 * scale) as usize;
        self.height = (self.height as f64 * scale) as usize;
        self.update_temporaries();
    }

    /// Uniformly distributed keypoint inside the image.
    pub fn create_random_keypoint<R: Rng + ?Sized>(&self, rng: &mut R) -> Keypoint {
        let u: f64 = rng.gen_range(0.0..1.0);
        let v: f64 = rng.gen_range(0.0..1.0);
        Vector2::new(u * self.width as f64, v * self.height as f64)
    }

    /// Random point at distance `depth` from the camera center whose
    /// projection is inside the image. A negative depth draws one in [0, 100).
    pub fn create_random_visible_point<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        depth: f64,
    ) -> Vector3<f64> {
        let keypoint = self.create_random_keypoint(rng);
        let (ray, _) = self.keypoint_to_euclidean(&keypoint);
        let depth = if depth < 0.0 {
            rng.gen_range(0.0..100.0)
        } else {
            depth
        };
        ray.normalize() * depth
    }

    pub fn is_binary_equal(&self, other: &Self) -> bool {
        self.fu == other.fu
            && self.fv == other.fv
            && self.cu == other.cu
            && self.cv == other.cv
            && self.width == other.width
            && self.height == other.height
            && self.recip_fu == other.recip_fu
            && self.recip_fv == other.recip_fv
            && self.fu_over_fv == other.fu_over_fv
            && self.distortion.is_binary_equal(&other.distortion)
    }

    /// Rays through the left, right and top/bottom border midpoints and the
    /// four corners.
    pub fn border_rays(&self) -> BorderRays {
        let ru = self.width as f64;
        let rv = self.height as f64;
        let keypoints = [
            Vector2::new(0.0, 0.0),
            Vector2::new(0.0, rv * 0.5),
            Vector2::new(0.0, rv - 1.0),
            Vector2::new(ru - 1.0, 0.0),
            Vector2::new(ru - 1.0, rv * 0.5),
            Vector2::new(ru - 1.0, rv - 1.0),
            Vector2::new(ru * 0.5, 0.0),
            Vector2::new(ru * 0.5, rv - 1.0),
        ];

        let mut rays = BorderRays::zeros();
        for (i, keypoint) in keypoints.iter().enumerate() {
            rays.set_column(i, &self.keypoint_to_homogeneous(keypoint).0);
        }
        rays
    }
}

impl<D: Distortion> CameraModel for PinholeProjection<D> {
    fn project(&self, point_camera: &Vector3<f64>) -> Option<Keypoint> {
        match self.euclidean_to_keypoint(point_camera) {
            (keypoint, true) => Some(keypoint),
            _ => None,
        }
    }

    fn unproject(&self, pixel: &Keypoint) -> Option<Vector3<f64>> {
        match self.keypoint_to_euclidean(pixel) {
            (ray, true) => Some(ray),
            _ => None,
        }
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// First three components with the sign of `w` folded in, plus that sign.
fn normalize_homogeneous(point: &Vector4<f64>) -> (Vector3<f64>, f64) {
    let head = point.xyz();
    if point.w < 0.0 { (-head, -1.0) } else { (head, 1.0) }
}
