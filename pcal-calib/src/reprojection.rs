use crate::observation::GridObservation;
use nalgebra::Point3;
use pcal_core::CameraModel;
use pcal_core::geometry::Transformation;

/// Summed pixel distance between detections and reprojected target points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReprojectionError {
    pub sum: f64,
    /// Points that were both detected and projected into the image
    pub count: usize,
}

impl ReprojectionError {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Reproject every detected target point through `target_from_camera`
/// inverted and accumulate the distance to its detection.
pub fn reprojection_error<C, O>(
    camera: &C,
    observation: &O,
    target_from_camera: &Transformation,
) -> ReprojectionError
where
    C: CameraModel + ?Sized,
    O: GridObservation + ?Sized,
{
    let camera_from_target = target_from_camera.inverse();
    let mut error = ReprojectionError::default();
    for (target_point, detected) in observation.correspondences() {
        let point_camera = camera_from_target * Point3::from(target_point);
        if let Some(predicted) = camera.project(&point_camera.coords) {
            error.sum += (detected - predicted).norm();
            error.count += 1;
        }
    }
    error
}
