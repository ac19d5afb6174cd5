pub mod camera;
pub mod error;
pub mod geometry;

pub use camera::{
    BorderRays, CameraModel, Distortion, EquidistantDistortion, FisheyeDistortion, Keypoint,
    NoDistortion, PinholeProjection, RadialTangentialDistortion,
};
pub use error::{CameraError, DistortionError, Result};
pub use geometry::Transformation;
