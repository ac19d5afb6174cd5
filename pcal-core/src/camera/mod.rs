//! Camera models and projections

pub mod distortion;
mod pinhole;

pub use distortion::{
    Distortion, EquidistantDistortion, FisheyeDistortion, NoDistortion,
    RadialTangentialDistortion,
};
pub use pinhole::{BorderRays, PinholeProjection};

use nalgebra::{Vector2, Vector3};

/// 2-D pixel coordinate
pub type Keypoint = Vector2<f64>;

/// Generic CameraModel
pub trait CameraModel {
    /// Project 3D point in camera frame to image coordinates.
    /// Returns None if point is behind camera or lands outside the image.
    fn project(&self, point_camera: &Vector3<f64>) -> Option<Keypoint>;

    /// Unproject image coordinates to a unit-depth ray in camera frame.
    /// Returns None if the keypoint is outside the image.
    fn unproject(&self, pixel: &Keypoint) -> Option<Vector3<f64>>;

    /// Get image dimensions (width, height) this camera is calibrated for
    fn image_size(&self) -> (usize, usize);
}
